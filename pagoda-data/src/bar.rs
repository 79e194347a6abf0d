use chrono::NaiveDateTime;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One unit of OHLCV for a security at a given frequency.
///
/// `time` is the bar start; a minute bar covering 09:30:00..09:31:00 carries
/// `time = 09:30:00` and its close is observable from 09:31:00.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Bar {
    pub time: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    /// Provider-supplied halt flag; zero volume is treated equivalently downstream.
    pub paused: bool,
}

impl Bar {
    /// Flat bar helper: all four prices equal, non-zero volume.
    pub fn flat(time: NaiveDateTime, price: Decimal, volume: u64) -> Self {
        Self::new(time, price, price, price, price, volume, false)
    }

    pub fn is_halted(&self) -> bool {
        self.paused || self.volume == 0
    }
}

/// Live quote snapshot returned by [`get_live_current`](crate::provider::DataProvider::get_live_current).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct LiveSnapshot {
    pub last_price: Decimal,
    pub high_limit: Decimal,
    pub low_limit: Decimal,
    pub paused: bool,
}
