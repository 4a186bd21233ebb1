use crate::subscription::Topic;
use arara_integration::error::SocketError;
use arara_markets::ExchangeId;
use thiserror::Error;

/// All errors generated in Data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error(
        "invalid sequence: prev_last_update_id {prev_last_update_id}, first_update_id {first_update_id}"
    )]
    InvalidSequence {
        prev_last_update_id: u64,
        first_update_id: u64,
    },

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("venue {exchange} does not support topic {topic}")]
    UnsupportedTopic { exchange: ExchangeId, topic: Topic },

    #[error("adapter configuration: {0}")]
    Configuration(String),
}

impl DataError {
    /// Build a parse error carrying a truncated payload echo.
    pub fn parse<E>(error: E, payload: &[u8]) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Socket(SocketError::deserialize(error, payload))
    }

    /// True for failures the reconnect loop is expected to absorb.
    pub fn is_retriable(&self) -> bool {
        match self {
            DataError::Socket(error) => error.is_retriable(),
            DataError::InvalidSequence { .. } | DataError::Snapshot(_) => true,
            DataError::UnknownInstrument(_)
            | DataError::UnsupportedTopic { .. }
            | DataError::Configuration(_) => false,
        }
    }
}
