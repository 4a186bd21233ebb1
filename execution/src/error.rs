use arara_data::order::ClientOrderId;
use thiserror::Error;

/// All errors generated in Execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("gateway transport error: {0}")]
    Gateway(String),

    #[error("order rejected by venue: {0}")]
    Rejected(String),

    #[error("venue does not support order replacement")]
    ReplaceUnsupported,

    #[error("unknown order: {0}")]
    UnknownOrder(ClientOrderId),
}
