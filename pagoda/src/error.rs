use crate::{risk::RiskVeto, scheduler::error::SchedulerError};
use pagoda_data::error::DataError;
use pagoda_execution::error::ExecutionError;
use pagoda_instrument::error::InstrumentError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PagodaError {
    #[error("instrument: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("market data: {0}")]
    Data(#[from] DataError),

    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("risk veto: {0}")]
    RiskVeto(#[from] RiskVeto),

    #[error("forbidden subscription: {0}")]
    Subscription(String),

    #[error("state persistence: {0}")]
    Persistence(String),

    #[error("driver invariant broken: {0}")]
    Fatal(String),
}
