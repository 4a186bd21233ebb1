use crate::error::SocketError;
use futures::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::client::IntoClientRequest,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;
use url::Url;

/// Communicative type alias for a tungstenite client handshake `Request`.
pub type WsRequest = tokio_tungstenite::tungstenite::handshake::client::Request;

/// Convenient type alias for a tungstenite `WebSocketStream`.
pub type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Communicative type alias for a tungstenite `WebSocketStream` sink half.
pub type WsSink = SplitSink<WebSocket, WsMessage>;

/// Communicative type alias for a tungstenite `WebSocketStream` stream half.
pub type WsStream = SplitStream<WebSocket>;

/// Communicative type alias for a tungstenite `Message`.
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Communicative type alias for a tungstenite `Error`.
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Connect asynchronously to the provided WebSocket server url.
///
/// Every call constructs a fresh socket; reconnecting callers must not
/// reuse a previously failed stream.
pub async fn connect(url: &Url) -> Result<WebSocket, SocketError> {
    debug!(%url, "attempting to establish WebSocket connection");
    connect_async(url.as_str())
        .await
        .map(|(websocket, _)| websocket)
        .map_err(SocketError::from)
}

/// Turn a url into a client handshake request venues can decorate with
/// headers (auth tokens, keep-alive hints) before connecting.
pub fn client_request(url: &Url) -> Result<WsRequest, SocketError> {
    url.as_str().into_client_request().map_err(SocketError::from)
}

/// Connect asynchronously using a prepared handshake request.
pub async fn connect_request(request: WsRequest) -> Result<WebSocket, SocketError> {
    debug!(uri = %request.uri(), "attempting to establish WebSocket connection");
    connect_async(request)
        .await
        .map(|(websocket, _)| websocket)
        .map_err(SocketError::from)
}

/// Close frame used when this side deliberately drops a connection that
/// failed its pong deadline.
pub fn stale_connection_close() -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Protocol,
        reason: "Stale connection".into(),
    }))
}

/// Close frame used for graceful, host-initiated disconnects.
pub fn normal_close() -> WsMessage {
    WsMessage::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
}

/// Determine whether a [`WsError`] means the connection is gone and a
/// reconnect cycle should begin.
pub fn is_websocket_disconnected(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Protocol(_)
    )
}
