use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum SchedulerError {
    #[error("invalid time expression: {0}")]
    InvalidTimeExpression(String),

    #[error("invalid weekday {0}, expected 0..=6")]
    InvalidWeekday(u32),

    #[error("invalid monthday {0}, expected 1..=31")]
    InvalidMonthday(u32),

    #[error("unknown task id: {0}")]
    UnknownTask(u64),
}
