use chrono::NaiveDate;
use pagoda_instrument::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Reason an order was vetoed by the risk controller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum RiskVeto {
    #[error("order value {value} exceeds per-order limit {limit}")]
    OrderValue { value: Decimal, limit: Decimal },

    #[error("daily trade count {count} reached limit {limit}")]
    DailyTrades { count: u32, limit: u32 },

    #[error("daily traded value would reach {value}, limit {limit}")]
    DailyValue { value: Decimal, limit: Decimal },

    #[error("holding count {count} reached limit {limit}")]
    HoldingCount { count: usize, limit: usize },

    #[error("position would take {ratio}% of portfolio, limit {limit}%")]
    PositionRatio { ratio: Decimal, limit: Decimal },
}

/// Threshold configuration; `None` disables the corresponding check.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RiskConfig {
    pub max_order_value: Option<Decimal>,
    pub max_daily_trade_value: Option<Decimal>,
    pub max_daily_trades: Option<u32>,
    pub max_stock_count: Option<usize>,
    /// Percent of total value one position may take, eg/ 20.
    pub max_position_ratio: Option<Decimal>,
    /// Percent loss versus cost at which [`RiskController::check_stop_loss`] trips, eg/ 5.
    pub stop_loss_ratio: Option<Decimal>,
}

/// Rolling per-day counters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskStats {
    pub current_date: Option<NaiveDate>,
    pub daily_trades: u32,
    pub daily_trade_value: Decimal,
    pub daily_buy_value: Decimal,
    pub daily_sell_value: Decimal,
    pub rejected_orders: u32,
}

impl Default for RiskStats {
    fn default() -> Self {
        Self {
            current_date: None,
            daily_trades: 0,
            daily_trade_value: Decimal::ZERO,
            daily_buy_value: Decimal::ZERO,
            daily_sell_value: Decimal::ZERO,
            rejected_orders: 0,
        }
    }
}

impl RiskStats {
    pub fn reset(&mut self, date: Option<NaiveDate>) {
        *self = Self {
            current_date: date,
            rejected_orders: self.rejected_orders,
            ..Self::default()
        };
    }
}

/// Vetoes orders against configured thresholds; never mutates the portfolio.
#[derive(Debug, Clone, Default)]
pub struct RiskController {
    pub config: RiskConfig,
    pub stats: RiskStats,
}

impl RiskController {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            stats: RiskStats::default(),
        }
    }

    /// Check an order before submission. A veto increments the rejection counter and
    /// leaves all other state untouched.
    pub fn check_order(
        &mut self,
        order_value: Decimal,
        positions_count: usize,
        total_value: Option<Decimal>,
        side: Side,
    ) -> Result<(), RiskVeto> {
        let result = self.evaluate(order_value, positions_count, total_value, side);
        if let Err(veto) = &result {
            self.stats.rejected_orders += 1;
            warn!(%veto, "order vetoed by risk controller");
        }
        result
    }

    fn evaluate(
        &self,
        order_value: Decimal,
        positions_count: usize,
        total_value: Option<Decimal>,
        side: Side,
    ) -> Result<(), RiskVeto> {
        if let Some(limit) = self.config.max_order_value
            && order_value > limit
        {
            return Err(RiskVeto::OrderValue {
                value: order_value,
                limit,
            });
        }

        if let Some(limit) = self.config.max_daily_trades
            && self.stats.daily_trades >= limit
        {
            return Err(RiskVeto::DailyTrades {
                count: self.stats.daily_trades,
                limit,
            });
        }

        if let Some(limit) = self.config.max_daily_trade_value {
            let projected = self.stats.daily_trade_value + order_value;
            if projected > limit {
                return Err(RiskVeto::DailyValue {
                    value: projected,
                    limit,
                });
            }
        }

        if side.is_buy() {
            if let Some(limit) = self.config.max_stock_count
                && positions_count >= limit
            {
                return Err(RiskVeto::HoldingCount {
                    count: positions_count,
                    limit,
                });
            }

            if let Some(limit) = self.config.max_position_ratio
                && let Some(total_value) = total_value
                && total_value > Decimal::ZERO
            {
                let ratio = order_value / total_value * Decimal::from(100);
                if ratio > limit {
                    return Err(RiskVeto::PositionRatio { ratio, limit });
                }
            }
        }

        Ok(())
    }

    /// Record a completed trade into the daily counters.
    pub fn record_trade(&mut self, order_value: Decimal, side: Side) {
        self.stats.daily_trades += 1;
        self.stats.daily_trade_value += order_value;
        match side {
            Side::Buy => self.stats.daily_buy_value += order_value,
            Side::Sell => self.stats.daily_sell_value += order_value,
        }
    }

    /// Reset the per-day counters at the start of a new trade day.
    pub fn reset_daily(&mut self, date: NaiveDate) {
        if self.stats.current_date != Some(date) {
            self.stats.reset(Some(date));
        }
    }

    /// The largest order value the controller would currently admit.
    pub fn max_order_value_allowed(&self) -> Option<Decimal> {
        let per_order = self.config.max_order_value;
        let daily_headroom = self
            .config
            .max_daily_trade_value
            .map(|limit| (limit - self.stats.daily_trade_value).max(Decimal::ZERO));
        match (per_order, daily_headroom) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Whether the loss versus cost exceeds the stop-loss threshold.
    pub fn check_stop_loss(&self, current_price: Decimal, cost_price: Decimal) -> bool {
        let Some(threshold) = self.config.stop_loss_ratio else {
            return false;
        };
        if cost_price <= Decimal::ZERO || current_price >= cost_price {
            return false;
        }
        let loss_percent = (cost_price - current_price) / cost_price * Decimal::from(100);
        loss_percent > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn controller() -> RiskController {
        RiskController::new(RiskConfig {
            max_order_value: Some(dec!(100000)),
            max_daily_trade_value: Some(dec!(500000)),
            max_daily_trades: Some(100),
            max_stock_count: Some(20),
            max_position_ratio: Some(dec!(20)),
            stop_loss_ratio: Some(dec!(5)),
        })
    }

    #[test]
    fn test_order_within_limits_passes() {
        let mut risk = controller();
        assert!(
            risk.check_order(dec!(50000), 10, None, Side::Buy).is_ok()
        );
        assert_eq!(risk.stats.rejected_orders, 0);
    }

    #[test]
    fn test_per_order_value_limit() {
        let mut risk = controller();
        let veto = risk
            .check_order(dec!(150000), 10, None, Side::Buy)
            .unwrap_err();
        assert!(matches!(veto, RiskVeto::OrderValue { .. }));
        assert_eq!(risk.stats.rejected_orders, 1);
    }

    #[test]
    fn test_daily_trade_count_limit() {
        let mut risk = controller();
        risk.stats.daily_trades = 100;
        let veto = risk
            .check_order(dec!(50000), 10, None, Side::Buy)
            .unwrap_err();
        assert!(matches!(veto, RiskVeto::DailyTrades { .. }));
    }

    #[test]
    fn test_daily_trade_value_limit() {
        let mut risk = controller();
        risk.stats.daily_trade_value = dec!(450000);
        let veto = risk
            .check_order(dec!(100000), 10, None, Side::Buy)
            .unwrap_err();
        assert!(matches!(veto, RiskVeto::DailyValue { .. }));
    }

    #[test]
    fn test_holding_count_limit_applies_to_buys_only() {
        let mut risk = controller();
        assert!(matches!(
            risk.check_order(dec!(50000), 20, None, Side::Buy),
            Err(RiskVeto::HoldingCount { .. })
        ));
        assert!(risk.check_order(dec!(50000), 20, None, Side::Sell).is_ok());
    }

    #[test]
    fn test_position_ratio_limit() {
        let mut risk = controller();
        // 80000 / 320000 = 25% > 20%
        let veto = risk
            .check_order(dec!(80000), 10, Some(dec!(320000)), Side::Buy)
            .unwrap_err();
        assert!(matches!(veto, RiskVeto::PositionRatio { .. }));
    }

    #[test]
    fn test_record_and_reset_daily_counters() {
        let mut risk = controller();
        risk.record_trade(dec!(50000), Side::Buy);
        risk.record_trade(dec!(30000), Side::Sell);

        assert_eq!(risk.stats.daily_trades, 2);
        assert_eq!(risk.stats.daily_trade_value, dec!(80000));
        assert_eq!(risk.stats.daily_buy_value, dec!(50000));
        assert_eq!(risk.stats.daily_sell_value, dec!(30000));

        let next_day = NaiveDate::from_ymd_opt(2024, 6, 13).unwrap();
        risk.reset_daily(next_day);
        assert_eq!(risk.stats.daily_trades, 0);
        assert_eq!(risk.stats.daily_trade_value, dec!(0));
        assert_eq!(risk.stats.current_date, Some(next_day));
    }

    #[test]
    fn test_max_order_value_allowed_shrinks_with_usage() {
        let mut risk = controller();
        assert_eq!(risk.max_order_value_allowed(), Some(dec!(100000)));

        risk.stats.daily_trade_value = dec!(450000);
        assert_eq!(risk.max_order_value_allowed(), Some(dec!(50000)));

        risk.stats.daily_trade_value = dec!(500000);
        assert_eq!(risk.max_order_value_allowed(), Some(dec!(0)));
    }

    #[test]
    fn test_stop_loss() {
        let risk = controller();
        assert!(risk.check_stop_loss(dec!(9.0), dec!(10.0)));
        assert!(!risk.check_stop_loss(dec!(9.8), dec!(10.0)));
        assert!(!risk.check_stop_loss(dec!(11.0), dec!(10.0)));
    }
}
