use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum InstrumentError {
    #[error("invalid security identifier: {0}")]
    InvalidSecurity(String),

    #[error("invalid market periods: {0}")]
    InvalidPeriods(String),
}
