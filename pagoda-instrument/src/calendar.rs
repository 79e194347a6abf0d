use crate::error::InstrumentError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

/// One continuous trading session, `[open, close)` for bar purposes.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct MarketPeriod {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl MarketPeriod {
    pub const fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }
}

/// The daily session periods of a venue. Treated as configuration, not constants.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct MarketPeriods(Vec<MarketPeriod>);

impl Default for MarketPeriods {
    /// Default A-share sessions: 09:30-11:30 and 13:00-15:00.
    fn default() -> Self {
        Self(vec![
            MarketPeriod::new(
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            ),
            MarketPeriod::new(
                NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            ),
        ])
    }
}

impl MarketPeriods {
    pub fn new(periods: Vec<MarketPeriod>) -> Result<Self, InstrumentError> {
        if periods.is_empty() {
            return Err(InstrumentError::InvalidPeriods("no periods".into()));
        }
        for window in periods.windows(2) {
            if window[0].close > window[1].open {
                return Err(InstrumentError::InvalidPeriods(
                    "periods overlap or are unordered".into(),
                ));
            }
        }
        for period in &periods {
            if period.open >= period.close {
                return Err(InstrumentError::InvalidPeriods(format!(
                    "open {} not before close {}",
                    period.open, period.close
                )));
            }
        }
        Ok(Self(periods))
    }

    /// Parse a `"09:30-11:30,13:00-15:00"` style configuration string.
    pub fn parse(config: &str) -> Result<Self, InstrumentError> {
        let parse_time = |part: &str| {
            NaiveTime::parse_from_str(part.trim(), "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(part.trim(), "%H:%M:%S"))
                .map_err(|_| {
                    InstrumentError::InvalidPeriods(format!("bad time in periods: {part}"))
                })
        };

        let periods = config
            .split(',')
            .map(|range| {
                let (open, close) = range.split_once('-').ok_or_else(|| {
                    InstrumentError::InvalidPeriods(format!("bad period range: {range}"))
                })?;
                Ok(MarketPeriod::new(parse_time(open)?, parse_time(close)?))
            })
            .collect::<Result<Vec<_>, InstrumentError>>()?;

        Self::new(periods)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketPeriod> {
        self.0.iter()
    }

    /// Open of the first session on the given trade day.
    pub fn session_open(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.0.first().expect("periods are non-empty").open)
    }

    /// Close of the last session on the given trade day.
    pub fn session_close(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.0.last().expect("periods are non-empty").close)
    }

    /// Whether the time of day falls inside any session, closes inclusive.
    pub fn is_in_session(&self, time: NaiveTime) -> bool {
        self.0
            .iter()
            .any(|period| period.open <= time && time <= period.close)
    }

    /// Every minute whose start lies within a session, excluding the close minute.
    ///
    /// Default sessions yield 240 bar-start minutes: 09:30..=11:29 and 13:00..=14:59.
    pub fn session_minutes(&self, day: NaiveDate) -> Vec<NaiveDateTime> {
        let mut minutes = Vec::new();
        for period in &self.0 {
            let mut cursor = day.and_time(period.open);
            let close = day.and_time(period.close);
            while cursor < close {
                minutes.push(cursor);
                cursor += TimeDelta::minutes(1);
            }
        }
        minutes
    }
}

/// The start of the first whole minute strictly after `dt`.
pub fn next_minute_after(dt: NaiveDateTime) -> NaiveDateTime {
    let truncated = dt
        .with_second(0)
        .and_then(|dt| dt.with_nanosecond(0))
        .expect("second/nanosecond zero is always valid");
    truncated + TimeDelta::minutes(1)
}

/// Whether a scheduled timepoint has aged past the grace window.
pub fn is_event_expired(scheduled: NaiveDateTime, now: NaiveDateTime, grace_secs: i64) -> bool {
    now.signed_duration_since(scheduled) > TimeDelta::seconds(grace_secs)
}
