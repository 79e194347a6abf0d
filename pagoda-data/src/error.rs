use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("no data for {security} at {detail}")]
    MissingData { security: String, detail: String },

    #[error("invalid price query: {0}")]
    InvalidQuery(String),
}
