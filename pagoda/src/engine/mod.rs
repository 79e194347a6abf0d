use chrono::NaiveDate;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Corporate-action engine: dividends, splits, halt-aware deferral.
pub mod actions;

/// Deterministic historical simulation driver.
pub mod backtest;

/// Wall-clock driver bound to a broker adapter.
pub mod live;

/// One end-of-day observation of the portfolio.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub total_value: Decimal,
    /// Returns since inception, as a fraction.
    pub returns: Decimal,
}
