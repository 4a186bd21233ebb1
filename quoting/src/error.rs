use arara_execution::ExecutionError;
use thiserror::Error;

/// All errors generated in Quoting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotingError {
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("invalid quote: {0}")]
    InvalidQuote(String),
}
