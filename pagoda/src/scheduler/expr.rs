use crate::scheduler::error::SchedulerError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use pagoda_data::request::Frequency;
use pagoda_instrument::calendar::MarketPeriods;

/// Session anchor of an offset expression.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Anchor {
    /// Open of the day's first session.
    Open,
    /// Close of the day's last session.
    Close,
}

/// A parsed symbolic time expression.
///
/// Grammar: `open`, `close`, `open±<n>[smh]`, `close±<n>[smh]`, `HH:MM[:SS]`,
/// `every_minute`, `every_bar`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TimeExpression {
    /// Session anchor plus a signed duration; the result need not fall inside a session.
    Offset { anchor: Anchor, delta: TimeDelta },
    /// A wall-clock time of day.
    Explicit(NaiveTime),
    /// Every minute whose start lies within a session, excluding the close minute.
    EveryMinute,
    /// [`EveryMinute`](TimeExpression::EveryMinute) under minute frequency; the session
    /// open under daily frequency. Pinned at schedule-generation time.
    EveryBar,
}

impl TimeExpression {
    /// Parse a symbolic time expression. Pure; any unrecognised input fails with
    /// [`SchedulerError::InvalidTimeExpression`].
    pub fn parse(input: &str) -> Result<Self, SchedulerError> {
        let trimmed = input.trim();
        match trimmed {
            "every_minute" => return Ok(TimeExpression::EveryMinute),
            "every_bar" => return Ok(TimeExpression::EveryBar),
            "open" => {
                return Ok(TimeExpression::Offset {
                    anchor: Anchor::Open,
                    delta: TimeDelta::zero(),
                });
            }
            "close" => {
                return Ok(TimeExpression::Offset {
                    anchor: Anchor::Close,
                    delta: TimeDelta::zero(),
                });
            }
            _ => {}
        }

        for (prefix, anchor) in [("open", Anchor::Open), ("close", Anchor::Close)] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                return Ok(TimeExpression::Offset {
                    anchor,
                    delta: parse_signed_duration(rest, input)?,
                });
            }
        }

        let explicit = NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map_err(|_| SchedulerError::InvalidTimeExpression(input.to_string()))?;
        Ok(TimeExpression::Explicit(explicit))
    }

    /// Resolve to the ordered, duplicate-free timepoints of one trade day.
    pub fn resolve(
        &self,
        trade_day: NaiveDate,
        periods: &MarketPeriods,
        frequency: Frequency,
    ) -> Vec<NaiveDateTime> {
        match self {
            TimeExpression::Offset { anchor, delta } => {
                let base = match anchor {
                    Anchor::Open => periods.session_open(trade_day),
                    Anchor::Close => periods.session_close(trade_day),
                };
                vec![base + *delta]
            }
            TimeExpression::Explicit(time) => vec![trade_day.and_time(*time)],
            TimeExpression::EveryMinute => periods.session_minutes(trade_day),
            TimeExpression::EveryBar => match frequency {
                Frequency::Minute => periods.session_minutes(trade_day),
                Frequency::Daily => vec![periods.session_open(trade_day)],
            },
        }
    }
}

/// Parse `±<n>[smh]` offsets, eg/ `-30m`, `+30s`, `+1h`.
fn parse_signed_duration(rest: &str, original: &str) -> Result<TimeDelta, SchedulerError> {
    let invalid = || SchedulerError::InvalidTimeExpression(original.to_string());

    let sign = match rest.chars().next() {
        Some('+') => 1i32,
        Some('-') => -1i32,
        _ => return Err(invalid()),
    };
    let magnitude = &rest[1..];

    let Some(unit) = magnitude.chars().last() else {
        return Err(invalid());
    };
    let digits = &magnitude[..magnitude.len() - unit.len_utf8()];
    if digits.is_empty() {
        return Err(invalid());
    }

    let quantity: i64 = digits.parse().map_err(|_| invalid())?;
    let delta = match unit {
        's' => TimeDelta::seconds(quantity),
        'm' => TimeDelta::minutes(quantity),
        'h' => TimeDelta::hours(quantity),
        _ => return Err(invalid()),
    };
    Ok(delta * sign)
}
