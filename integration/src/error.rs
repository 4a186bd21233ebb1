use thiserror::Error;

/// All socket-level errors generated by Integration consumers.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("error deserializing message: {error}; payload: {payload}")]
    Deserialize { error: String, payload: String },

    #[error("error serializing outbound message: {0}")]
    Serialize(String),

    #[error("error subscribing to resources over the socket: {0}")]
    Subscribe(String),

    #[error("connection terminated by remote: {0}")]
    Terminated(String),

    #[error("stale connection: pong not received within the deadline")]
    Stale,

    #[error("authentication failure: {0}")]
    Auth(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<tokio_tungstenite::tungstenite::Error> for SocketError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

impl SocketError {
    /// Build a [`SocketError::Deserialize`] with a truncated payload echo.
    pub fn deserialize<E>(error: E, payload: &[u8]) -> Self
    where
        E: std::fmt::Display,
    {
        const MAX_ECHO: usize = 512;
        let text = String::from_utf8_lossy(&payload[..payload.len().min(MAX_ECHO)]);
        Self::Deserialize {
            error: error.to_string(),
            payload: text.into_owned(),
        }
    }

    /// True for failures the reconnect loop is expected to absorb.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SocketError::WebSocket(_)
                | SocketError::Terminated(_)
                | SocketError::Stale
                | SocketError::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_truncates_payload_echo() {
        let payload = vec![b'x'; 2048];
        let SocketError::Deserialize { payload: echoed, .. } =
            SocketError::deserialize("boom", &payload)
        else {
            panic!("expected Deserialize variant");
        };
        assert_eq!(echoed.len(), 512);
    }

    #[test]
    fn test_retriable_classification() {
        assert!(SocketError::Stale.is_retriable());
        assert!(SocketError::Terminated("close frame".into()).is_retriable());
        assert!(!SocketError::Auth("bad key".into()).is_retriable());
        assert!(!SocketError::Cancelled.is_retriable());
    }
}
