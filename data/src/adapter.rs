//! Venue hook set implemented by each adapter.
//!
//! The lifecycle machinery in [`connection`](crate::connection) is shared;
//! everything venue-specific flows through [`AdapterOps`]. Composition over
//! inheritance: a [`ConnectionCore`](crate::connection::ConnectionCore) owns
//! one `Arc<dyn AdapterOps>`.

use crate::error::DataError;
use crate::subscription::{SubscriptionSet, Topic};
use arara_integration::protocol::websocket::{WsMessage, WsRequest};
use arara_markets::{ExchangeId, InstrumentId};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Default inactivity window before the heartbeat watchdog pings.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pong deadline after a watchdog ping.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound handle hooks use to write frames onto the live socket.
///
/// Sends enqueue onto the connection's writer task, so hooks never block on
/// socket backpressure and never observe the sink directly.
#[derive(Debug, Clone)]
pub struct AdapterIo {
    tx: mpsc::UnboundedSender<WsMessage>,
}

impl AdapterIo {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WsMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, message: WsMessage) -> Result<(), DataError> {
        self.tx.send(message).map_err(|_| {
            DataError::Socket(arara_integration::SocketError::Terminated(
                "writer task gone".into(),
            ))
        })
    }

    pub fn send_text(&self, text: String) -> Result<(), DataError> {
        self.send(WsMessage::text(text))
    }
}

/// Venue-specific hooks invoked by the shared connection lifecycle.
#[async_trait]
pub trait AdapterOps: Send + Sync + fmt::Debug {
    fn exchange(&self) -> ExchangeId;

    /// Deterministic connection url for the configured product type and, for
    /// private streams, a freshly issued token.
    async fn base_url(&self) -> Result<Url, DataError>;

    /// Decorate the client handshake request (keep-alive hints, auth
    /// headers). Default: untouched.
    fn configure_request(&self, _request: &mut WsRequest) -> Result<(), DataError> {
        Ok(())
    }

    /// True when this adapter carries an authenticated private stream.
    fn has_private_stream(&self) -> bool {
        false
    }

    /// Authenticate a private stream, eg/ by sending an auth frame. Called
    /// after connect, before any subscription. Default: no-op.
    async fn authenticate(&self, _io: &AdapterIo) -> Result<(), DataError> {
        Ok(())
    }

    /// Subscribe the venue's private topics. Called after a successful
    /// [`Self::authenticate`]. Default: no-op.
    async fn subscribe_to_private_topics(&self, _io: &AdapterIo) -> Result<(), DataError> {
        Ok(())
    }

    /// Emit the wire subscription message(s).
    ///
    /// `set` is the full canonical subscription memory, `delta` the pairs
    /// new to this call. Venues that overwrite subscriptions on every
    /// request send from `set`; venues with incremental subscriptions send
    /// only `delta`. On reconnect the framework passes the whole set as the
    /// delta.
    async fn send_subscribe(
        &self,
        io: &AdapterIo,
        set: &SubscriptionSet,
        delta: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError>;

    /// Emit the wire unsubscription message(s); `removed` holds the pairs
    /// dropped from the canonical set.
    async fn send_unsubscribe(
        &self,
        io: &AdapterIo,
        set: &SubscriptionSet,
        removed: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError>;

    /// Parse one complete inbound message and dispatch any normalised
    /// events. The payload is the whole message as an immutable byte region.
    fn process_message(&self, payload: &Bytes) -> Result<(), DataError>;

    /// Venue application-level ping frame. `None` means pings are
    /// protocol-level (the watchdog sends a WebSocket `Ping`) or suppressed.
    fn ping_message(&self) -> Option<WsMessage> {
        None
    }

    /// Byte-level predicate for venue application-level pong frames.
    fn is_pong_message(&self, _payload: &[u8]) -> bool {
        false
    }

    /// Inactivity window before the watchdog pings; `None` disables the
    /// watchdog entirely (venues with fire-and-forget heartbeats).
    fn inactivity_timeout(&self) -> Option<Duration> {
        Some(DEFAULT_INACTIVITY_TIMEOUT)
    }

    fn ping_timeout(&self) -> Duration {
        DEFAULT_PING_TIMEOUT
    }

    /// Unconditional ping cadence, independent of inbound activity
    /// (eg/ Bithumb every 30s, Coinone every 5min). Default: none.
    fn forced_ping_interval(&self) -> Option<Duration> {
        None
    }
}
