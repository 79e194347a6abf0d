use pagoda_data::request::Frequency;
use pagoda_execution::pricing::{MarketProtect, OrderCost, Slippage};
use pagoda_instrument::{calendar::MarketPeriods, security::Security};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Runtime configuration shared by both drivers.
///
/// Mutable from strategy code via `set_option` / `set_slippage` / `set_order_cost` /
/// `set_benchmark` during `initialize`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuntimeSettings {
    /// Match against raw exchange prices instead of previous-adjusted series.
    pub use_real_price: bool,
    /// Bar frequency the drivers advance at; also pins `every_bar` resolution.
    pub frequency: Frequency,
    /// Cap on the share of one bar's volume a single order may take. Stored for
    /// compatibility; bar-synchronous matching does not model book depth.
    pub order_volume_ratio: Decimal,
    /// Orders larger than this are split into consecutive child orders (live).
    pub order_max_volume: i64,
    /// Seconds to wait for a broker order to reach a terminal state; 0 means
    /// fire-and-forget (live).
    pub trade_max_wait_time: u64,
    /// Interval between background saves of the strategy globals (live), seconds.
    pub autosave_interval: u64,
    /// Strategy-requested tick-subscription cap; the effective cap never exceeds the
    /// broker's own limit.
    pub subscribe_limit: Option<usize>,
    pub benchmark: Option<Security>,
    pub order_cost: OrderCost,
    pub slippage: Slippage,
    pub market_protect: MarketProtect,
    pub market_periods: MarketPeriods,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            use_real_price: false,
            frequency: Frequency::Daily,
            order_volume_ratio: Decimal::new(25, 2),
            order_max_volume: 1_000_000,
            trade_max_wait_time: 30,
            autosave_interval: 60,
            subscribe_limit: None,
            benchmark: None,
            order_cost: OrderCost::default(),
            slippage: Slippage::default(),
            market_protect: MarketProtect::default(),
            market_periods: MarketPeriods::default(),
        }
    }
}

impl RuntimeSettings {
    /// Apply an open-keyed option. Known keys mutate the matching field; unknown keys
    /// are logged and ignored.
    pub fn set_option(&mut self, key: &str, value: Value) {
        match key {
            "use_real_price" => {
                if let Some(flag) = value.as_bool() {
                    self.use_real_price = flag;
                }
            }
            "backtest_frequency" => match value.as_str() {
                Some("minute") => self.frequency = Frequency::Minute,
                Some("daily") | Some("day") => self.frequency = Frequency::Daily,
                other => warn!(?other, "unrecognised backtest_frequency value ignored"),
            },
            "order_volume_ratio" => {
                if let Some(ratio) = value.as_f64().and_then(Decimal::from_f64_retain) {
                    self.order_volume_ratio = ratio;
                }
            }
            "order_max_volume" => {
                if let Some(volume) = value.as_i64() {
                    self.order_max_volume = volume;
                }
            }
            "trade_max_wait_time" => {
                if let Some(secs) = value.as_u64() {
                    self.trade_max_wait_time = secs;
                }
            }
            "autosave_interval" => {
                if let Some(secs) = value.as_u64() {
                    self.autosave_interval = secs;
                }
            }
            "subscribe_limit" => {
                self.subscribe_limit = value
                    .as_u64()
                    .and_then(|limit| usize::try_from(limit).ok());
            }
            "market_periods" => {
                match value.as_str().map(MarketPeriods::parse) {
                    Some(Ok(periods)) => self.market_periods = periods,
                    other => warn!(?other, "unrecognised market_periods value ignored"),
                }
            }
            unknown => {
                warn!(option = unknown, "unknown option ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_known_options() {
        let mut settings = RuntimeSettings::default();

        settings.set_option("use_real_price", json!(true));
        settings.set_option("backtest_frequency", json!("minute"));
        settings.set_option("order_max_volume", json!(5000));
        settings.set_option("trade_max_wait_time", json!(0));
        settings.set_option("subscribe_limit", json!(50));

        assert!(settings.use_real_price);
        assert_eq!(settings.frequency, Frequency::Minute);
        assert_eq!(settings.order_max_volume, 5000);
        assert_eq!(settings.trade_max_wait_time, 0);
        assert_eq!(settings.subscribe_limit, Some(50));
    }

    #[test]
    fn test_unknown_option_is_ignored() {
        let mut settings = RuntimeSettings::default();
        let before = settings.clone();
        settings.set_option("definitely_not_an_option", json!(42));
        assert_eq!(settings, before);
    }

    #[test]
    fn test_market_periods_option() {
        let mut settings = RuntimeSettings::default();
        settings.set_option("market_periods", json!("09:30-10:30"));
        assert_eq!(
            settings.market_periods,
            MarketPeriods::parse("09:30-10:30").unwrap()
        );
    }
}
