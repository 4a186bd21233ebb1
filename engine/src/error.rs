//! Central error type aggregating the subsystem errors.

use arara_data::DataError;
use arara_execution::ExecutionError;
use arara_markets::IndexError;
use arara_quoting::QuotingError;
use thiserror::Error;

/// Central error type for engine assembly and lifecycle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IndexError: {0}")]
    Index(#[from] IndexError),

    #[error("MarketData: {0}")]
    MarketData(#[from] DataError),

    #[error("Execution: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Quoting: {0}")]
    Quoting(#[from] QuotingError),

    #[error("Builder: {0}")]
    Builder(String),
}
