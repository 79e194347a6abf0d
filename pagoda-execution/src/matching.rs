use crate::{
    error::ExecutionError,
    order::{Order, OrderStatus, OrderStyle},
    portfolio::Portfolio,
    pricing::{MarketProtect, OrderCost, PriceCage, Slippage, price_cage},
    trade::Trade,
};
use pagoda_instrument::{Side, tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pricing configuration shared by every match attempt.
#[derive(Debug, Copy, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct MatchConfig {
    pub order_cost: OrderCost,
    pub slippage: Slippage,
    pub market_protect: MarketProtect,
}

/// Bar-synchronous matcher: one fill attempt per order against one reference price.
///
/// The working price is the reference with slippage applied, clamped into the price
/// cage, then rounded onto the tick grid (up for buys, down for sells). Limit orders
/// must be marketable against the working price and are rejected otherwise; there is
/// no resting book.
#[derive(Debug, Clone, Default)]
pub struct MatchingEngine {
    pub config: MatchConfig,
}

impl MatchingEngine {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// Attempt to fill `order` at the reference price, mutating the portfolio on
    /// success.
    ///
    /// Halted securities reject the order with a warning and no error. Resource and
    /// cage failures reject the order and surface the error; the portfolio is left
    /// unchanged in every failure case.
    pub fn match_order(
        &self,
        order: &mut Order,
        reference: Decimal,
        halted: bool,
        portfolio: &mut Portfolio,
    ) -> Result<Option<Trade>, ExecutionError> {
        if halted {
            warn!(security = %order.security, order = %order.id, "order on halted security rejected");
            order.status = OrderStatus::Rejected;
            return Ok(None);
        }
        if reference <= Decimal::ZERO {
            order.status = OrderStatus::Rejected;
            return Err(ExecutionError::NoReferencePrice {
                security: order.security.to_string(),
            });
        }

        let cage = price_cage(&order.security, reference);
        let exec_price = self.execution_price(order, reference, &cage)?;

        match order.side {
            Side::Buy => self.fill_buy(order, exec_price, portfolio),
            Side::Sell => self.fill_sell(order, exec_price, portfolio),
        }
    }

    /// Derive the execution price: slippage, cage clamp, tick rounding, and limit
    /// marketability.
    fn execution_price(
        &self,
        order: &mut Order,
        reference: Decimal,
        cage: &PriceCage,
    ) -> Result<Decimal, ExecutionError> {
        let working = self.config.slippage.apply(reference, order.side);
        let working = cage.clamp(working, order.side);
        let working = tick::round_price(&order.security, working, order.side);

        match order.style {
            OrderStyle::Market { .. } => Ok(working),
            OrderStyle::Limit { price: limit } => match order.side {
                Side::Buy if limit > cage.buy_upper => {
                    order.status = OrderStatus::Rejected;
                    Err(ExecutionError::PriceOutOfCage {
                        security: order.security.to_string(),
                        detail: format!("limit {limit} above buy cage {}", cage.buy_upper),
                    })
                }
                Side::Sell if limit < cage.sell_lower => {
                    order.status = OrderStatus::Rejected;
                    Err(ExecutionError::PriceOutOfCage {
                        security: order.security.to_string(),
                        detail: format!("limit {limit} below sell cage {}", cage.sell_lower),
                    })
                }
                Side::Buy if working > limit => {
                    order.status = OrderStatus::Rejected;
                    Err(ExecutionError::PriceOutOfCage {
                        security: order.security.to_string(),
                        detail: format!("limit {limit} below required buy price {working}"),
                    })
                }
                Side::Sell if working < limit => {
                    order.status = OrderStatus::Rejected;
                    Err(ExecutionError::PriceOutOfCage {
                        security: order.security.to_string(),
                        detail: format!("limit {limit} above required sell price {working}"),
                    })
                }
                _ => Ok(working),
            },
        }
    }

    fn fill_buy(
        &self,
        order: &mut Order,
        price: Decimal,
        portfolio: &mut Portfolio,
    ) -> Result<Option<Trade>, ExecutionError> {
        let value = price * Decimal::from(order.amount);
        let (commission, tax) = self
            .config
            .order_cost
            .fees(&order.security, Side::Buy, value);
        let required = value + commission + tax;

        if portfolio.cash < required {
            order.status = OrderStatus::Rejected;
            return Err(ExecutionError::InsufficientCash {
                required: required.to_string(),
                available: portfolio.cash.to_string(),
            });
        }

        order.record_fill(order.amount, price, commission, tax);
        let trade = Trade::new(
            order.submitted_at,
            order.security.clone(),
            Side::Buy,
            order.filled_amount,
            price,
            commission,
            tax,
            order.id.clone(),
        );
        portfolio.apply_trade(&trade);
        Ok(Some(trade))
    }

    fn fill_sell(
        &self,
        order: &mut Order,
        price: Decimal,
        portfolio: &mut Portfolio,
    ) -> Result<Option<Trade>, ExecutionError> {
        let closeable = portfolio.closeable_amount(&order.security);
        if closeable <= 0 {
            order.status = OrderStatus::Rejected;
            return Err(ExecutionError::InsufficientPosition {
                security: order.security.to_string(),
                requested: order.amount,
                closeable,
            });
        }

        // Fill up to the closeable amount; any remainder is cancelled, not rested.
        let fill_amount = order.amount.min(closeable);
        let value = price * Decimal::from(fill_amount);
        let (commission, tax) = self
            .config
            .order_cost
            .fees(&order.security, Side::Sell, value);

        order.record_fill(fill_amount, price, commission, tax);
        if order.filled_amount < order.amount {
            warn!(
                security = %order.security,
                order = %order.id,
                requested = order.amount,
                filled = fill_amount,
                "sell truncated to closeable amount; remainder cancelled"
            );
            order.status = OrderStatus::Cancelled;
        }

        let trade = Trade::new(
            order.submitted_at,
            order.security.clone(),
            Side::Sell,
            fill_amount,
            price,
            commission,
            tax,
            order.id.clone(),
        );
        portfolio.apply_trade(&trade);
        Ok(Some(trade))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderId;
    use chrono::NaiveDate;
    use pagoda_instrument::security::Security;
    use rust_decimal_macros::dec;

    fn security() -> Security {
        Security::parse("600000.XSHG").unwrap()
    }

    fn order(side: Side, style: OrderStyle, amount: i64) -> Order {
        Order::new(
            OrderId::from_seq(1),
            security(),
            side,
            style,
            amount,
            NaiveDate::from_ymd_opt(2024, 6, 12)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        )
    }

    fn engine_without_slippage() -> MatchingEngine {
        MatchingEngine::new(MatchConfig {
            slippage: Slippage::zero(),
            ..MatchConfig::default()
        })
    }

    #[test]
    fn test_market_buy_fills_at_reference() {
        let engine = engine_without_slippage();
        let mut portfolio = Portfolio::new(dec!(100000));
        let mut order = order(Side::Buy, OrderStyle::market(), 100);

        let trade = engine
            .match_order(&mut order, dec!(10.0), false, &mut portfolio)
            .unwrap()
            .unwrap();

        assert_eq!(trade.price, dec!(10.0));
        assert_eq!(trade.amount, 100);
        assert_eq!(trade.commission, dec!(5));
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(portfolio.cash, dec!(98995));
    }

    #[test]
    fn test_slippage_moves_buy_price_up() {
        let engine = MatchingEngine::default();
        let mut portfolio = Portfolio::new(dec!(100000));
        let mut order = order(Side::Buy, OrderStyle::market(), 100);

        let trade = engine
            .match_order(&mut order, dec!(10.0), false, &mut portfolio)
            .unwrap()
            .unwrap();

        // 10.0 * 1.001, tick-rounded up
        assert_eq!(trade.price, dec!(10.01));
    }

    #[test]
    fn test_buy_insufficient_cash_rejects_and_leaves_portfolio() {
        let engine = engine_without_slippage();
        let mut portfolio = Portfolio::new(dec!(500));
        let mut order = order(Side::Buy, OrderStyle::market(), 100);

        let result = engine.match_order(&mut order, dec!(10.0), false, &mut portfolio);
        assert!(matches!(
            result,
            Err(ExecutionError::InsufficientCash { .. })
        ));
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(portfolio.cash, dec!(500));
        assert!(portfolio.positions.is_empty());
    }

    #[test]
    fn test_halted_security_rejects_without_error() {
        let engine = engine_without_slippage();
        let mut portfolio = Portfolio::new(dec!(100000));
        let mut order = order(Side::Buy, OrderStyle::market(), 100);

        let outcome = engine
            .match_order(&mut order, dec!(10.0), true, &mut portfolio)
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[test]
    fn test_limit_buy_above_cage_rejected() {
        let engine = engine_without_slippage();
        let mut portfolio = Portfolio::new(dec!(100000));
        let mut order = order(Side::Buy, OrderStyle::limit(dec!(10.5)), 100);

        let result = engine.match_order(&mut order, dec!(10.0), false, &mut portfolio);
        assert!(matches!(result, Err(ExecutionError::PriceOutOfCage { .. })));
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[test]
    fn test_limit_buy_below_reference_unmarketable() {
        let engine = engine_without_slippage();
        let mut portfolio = Portfolio::new(dec!(100000));
        let mut order = order(Side::Buy, OrderStyle::limit(dec!(9.5)), 100);

        let result = engine.match_order(&mut order, dec!(10.0), false, &mut portfolio);
        assert!(matches!(result, Err(ExecutionError::PriceOutOfCage { .. })));
    }

    #[test]
    fn test_sell_truncates_to_closeable() {
        let engine = engine_without_slippage();
        let mut portfolio = Portfolio::new(dec!(100000));

        let mut buy = order(Side::Buy, OrderStyle::market(), 200);
        engine
            .match_order(&mut buy, dec!(10.0), false, &mut portfolio)
            .unwrap();
        portfolio.refresh_closeable();

        // Sell 300 against 200 closeable: fill 200, cancel the rest
        let mut sell = order(Side::Sell, OrderStyle::market(), 300);
        let trade = engine
            .match_order(&mut sell, dec!(10.0), false, &mut portfolio)
            .unwrap()
            .unwrap();

        assert_eq!(trade.amount, 200);
        assert_eq!(sell.filled_amount, 200);
        assert_eq!(sell.status, OrderStatus::Cancelled);
        assert_eq!(portfolio.total_amount(&security()), 0);
    }

    #[test]
    fn test_sell_without_position_rejected() {
        let engine = engine_without_slippage();
        let mut portfolio = Portfolio::new(dec!(100000));
        let mut sell = order(Side::Sell, OrderStyle::market(), 100);

        let result = engine.match_order(&mut sell, dec!(10.0), false, &mut portfolio);
        assert!(matches!(
            result,
            Err(ExecutionError::InsufficientPosition { .. })
        ));
    }
}
