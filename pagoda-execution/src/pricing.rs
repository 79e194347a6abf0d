use pagoda_instrument::{
    Side,
    exchange::Exchange,
    security::{Security, SecurityKind},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Commission and stamp-tax schedule, configurable via `set_order_cost`.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderCost {
    pub open_commission_rate: Decimal,
    pub close_commission_rate: Decimal,
    pub min_commission: Decimal,
    pub close_tax_rate: Decimal,
}

impl Default for OrderCost {
    fn default() -> Self {
        Self {
            open_commission_rate: Decimal::new(3, 4),
            close_commission_rate: Decimal::new(3, 4),
            min_commission: Decimal::from(5),
            close_tax_rate: Decimal::new(1, 3),
        }
    }
}

impl OrderCost {
    /// Commission and stamp tax for a gross traded `value`.
    ///
    /// Stamp tax applies to sells only, and never to funds/ETFs or bonds.
    pub fn fees(&self, security: &Security, side: Side, value: Decimal) -> (Decimal, Decimal) {
        let rate = match side {
            Side::Buy => self.open_commission_rate,
            Side::Sell => self.close_commission_rate,
        };
        let commission = (value * rate).max(self.min_commission);

        let tax = match (side, security.kind()) {
            (Side::Sell, SecurityKind::Stock | SecurityKind::Star) => value * self.close_tax_rate,
            _ => Decimal::ZERO,
        };

        (commission, tax)
    }
}

/// Multiplicative slippage applied to the match reference price before cage clamping
/// and tick rounding.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Slippage {
    pub buy_percent: Decimal,
    pub sell_percent: Decimal,
}

impl Default for Slippage {
    fn default() -> Self {
        Self {
            buy_percent: Decimal::new(1, 3),
            sell_percent: Decimal::new(-1, 3),
        }
    }
}

impl Slippage {
    pub fn zero() -> Self {
        Self {
            buy_percent: Decimal::ZERO,
            sell_percent: Decimal::ZERO,
        }
    }

    pub fn apply(&self, reference: Decimal, side: Side) -> Decimal {
        let percent = match side {
            Side::Buy => self.buy_percent,
            Side::Sell => self.sell_percent,
        };
        reference * (Decimal::ONE + percent)
    }
}

/// Default protect percent for market orders, overridable per order style.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketProtect {
    pub buy_percent: Decimal,
    pub sell_percent: Decimal,
}

impl Default for MarketProtect {
    fn default() -> Self {
        Self {
            buy_percent: Decimal::new(15, 3),
            sell_percent: Decimal::new(-15, 3),
        }
    }
}

/// The acceptance band around the match reference price.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceCage {
    pub buy_upper: Decimal,
    pub sell_lower: Decimal,
}

/// Compute the cage for a security around a reference price.
///
/// Main boards use a symmetric 2% band; Beijing uses the wider of 5% or 0.1 yuan.
pub fn price_cage(security: &Security, reference: Decimal) -> PriceCage {
    match security.exchange() {
        Exchange::Beijing => PriceCage {
            buy_upper: (reference * Decimal::new(105, 2)).max(reference + Decimal::new(1, 1)),
            sell_lower: (reference * Decimal::new(95, 2)).min(reference - Decimal::new(1, 1)),
        },
        Exchange::Shenzhen | Exchange::Shanghai => PriceCage {
            buy_upper: reference * Decimal::new(102, 2),
            sell_lower: reference * Decimal::new(98, 2),
        },
    }
}

impl PriceCage {
    /// Clamp a working price into the cage for the given side.
    pub fn clamp(&self, price: Decimal, side: Side) -> Decimal {
        match side {
            Side::Buy => price.min(self.buy_upper),
            Side::Sell => price.max(self.sell_lower),
        }
    }
}

/// Percent used to price a market order, preferring the per-order override.
pub fn resolve_market_percent(
    style_percent: Option<Decimal>,
    side: Side,
    config: &MarketProtect,
) -> Decimal {
    style_percent.unwrap_or(match side {
        Side::Buy => config.buy_percent,
        Side::Sell => config.sell_percent,
    })
}

/// Protect price of a market order: `reference * (1 + percent)`, clamped to the cage.
pub fn market_protect_price(
    reference: Decimal,
    percent: Decimal,
    cage: &PriceCage,
    side: Side,
) -> Decimal {
    cage.clamp(reference * (Decimal::ONE + percent), side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn security(id: &str) -> Security {
        Security::parse(id).unwrap()
    }

    #[test]
    fn test_stock_fees() {
        let cost = OrderCost::default();
        let stock = security("600000.XSHG");

        // Buy below the minimum commission floor
        let (commission, tax) = cost.fees(&stock, Side::Buy, dec!(10000));
        assert_eq!(commission, dec!(5));
        assert_eq!(tax, dec!(0));

        // Large sell pays rate-based commission plus stamp tax
        let (commission, tax) = cost.fees(&stock, Side::Sell, dec!(100000));
        assert_eq!(commission, dec!(30));
        assert_eq!(tax, dec!(100));
    }

    #[test]
    fn test_etf_has_no_stamp_tax() {
        let cost = OrderCost::default();
        let etf = security("510050.XSHG");
        let (_, tax) = cost.fees(&etf, Side::Sell, dec!(100000));
        assert_eq!(tax, dec!(0));
    }

    #[test]
    fn test_cage_mainboard() {
        let cage = price_cage(&security("600000.XSHG"), dec!(10.0));
        assert_eq!(cage.buy_upper, dec!(10.2));
        assert_eq!(cage.sell_lower, dec!(9.8));
    }

    #[test]
    fn test_cage_beijing() {
        let cage = price_cage(&security("430047.BJ"), dec!(10.0));
        assert_eq!(cage.buy_upper, dec!(10.5));
        assert_eq!(cage.sell_lower, dec!(9.5));

        // Low-priced: the absolute 0.1 band dominates
        let cage = price_cage(&security("430047.BJ"), dec!(1.0));
        assert_eq!(cage.buy_upper, dec!(1.1));
        assert_eq!(cage.sell_lower, dec!(0.9));
    }

    #[test]
    fn test_protect_price_defaults_and_clamp() {
        let cage = price_cage(&security("600000.XSHG"), dec!(10.0));
        let config = MarketProtect::default();

        let buy = market_protect_price(
            dec!(10.0),
            resolve_market_percent(None, Side::Buy, &config),
            &cage,
            Side::Buy,
        );
        assert_eq!(buy, dec!(10.15));

        let sell = market_protect_price(
            dec!(10.0),
            resolve_market_percent(None, Side::Sell, &config),
            &cage,
            Side::Sell,
        );
        assert_eq!(sell, dec!(9.85));

        // Pulled past the cage: clamped to the band edge
        let clamped = market_protect_price(dec!(10.0), dec!(0.5), &cage, Side::Buy);
        assert_eq!(clamped, dec!(10.2));
    }

    #[test]
    fn test_style_percent_overrides_config() {
        let config = MarketProtect::default();
        assert_eq!(
            resolve_market_percent(Some(dec!(0.02)), Side::Buy, &config),
            dec!(0.02)
        );
        assert_eq!(
            resolve_market_percent(None, Side::Sell, &config),
            dec!(-0.015)
        );
    }

    #[test]
    fn test_slippage_direction() {
        let slippage = Slippage::default();
        assert_eq!(slippage.apply(dec!(10.0), Side::Buy), dec!(10.01));
        assert_eq!(slippage.apply(dec!(10.0), Side::Sell), dec!(9.99));
    }
}
