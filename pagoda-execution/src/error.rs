use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum ExecutionError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("insufficient cash: need {required}, have {available}")]
    InsufficientCash { required: String, available: String },

    #[error("insufficient closeable position for {security}: need {requested}, have {closeable}")]
    InsufficientPosition {
        security: String,
        requested: i64,
        closeable: i64,
    },

    #[error("price outside cage for {security}: {detail}")]
    PriceOutOfCage { security: String, detail: String },

    #[error("{security} is halted")]
    Halted { security: String },

    #[error("no reference price for {security}")]
    NoReferencePrice { security: String },

    #[error("broker adapter: {0}")]
    Adapter(String),

    #[error("broker request timed out after {0}s")]
    AdapterTimeout(u64),
}
