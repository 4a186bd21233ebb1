//! Connection lifecycle shared by every venue adapter.
//!
//! One [`ConnectionCore`] owns the socket of one adapter: a supervisor task
//! drives connect / reconnect with the fixed backoff ladder, a receive loop
//! hands whole inbound messages to the adapter, and a heartbeat watchdog
//! enforces inactivity and pong deadlines. All venue behaviour is delegated
//! to the owned [`AdapterOps`].

use crate::adapter::{AdapterIo, AdapterOps};
use crate::error::DataError;
use crate::subscription::{SubscriptionSet, Topic};
use arara_integration::event::{EventHub, HubSubscription};
use arara_integration::protocol::websocket::{
    self, normal_close, stale_connection_close, WsMessage, WsSink, WsStream,
};
use arara_integration::retry::RetrySchedule;
use arara_integration::shutdown::{shutdown_channel, ShutdownToken, ShutdownTrigger};
use arara_integration::SocketError;
use arara_markets::{ExchangeId, InstrumentId};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, warn};

/// Deadline for joining lifecycle tasks on disconnect.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection configuration overrides.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub retry: RetrySchedule,
    /// Overrides the adapter's inactivity window when set.
    pub inactivity_timeout: Option<Duration>,
    /// Overrides the adapter's pong deadline when set.
    pub ping_timeout: Option<Duration>,
}

/// Connection liveness transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateChanged {
    pub exchange: ExchangeId,
    pub connected: bool,
    pub reason: SmolStr,
}

struct Lifecycle {
    trigger: ShutdownTrigger,
    supervisor: JoinHandle<()>,
}

/// Owns one adapter's socket lifecycle.
pub struct ConnectionCore {
    adapter: Arc<dyn AdapterOps>,
    config: ConnectionConfig,
    subscriptions: Mutex<SubscriptionSet>,
    io: Mutex<Option<AdapterIo>>,
    connected: AtomicBool,
    state_changed: EventHub<ConnectionStateChanged>,
    errors: EventHub<DataError>,
    pong_pending: Mutex<Option<oneshot::Sender<()>>>,
    lifecycle: Mutex<Option<Lifecycle>>,
}

impl fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCore")
            .field("exchange", &self.adapter.exchange())
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl ConnectionCore {
    pub fn new(adapter: Arc<dyn AdapterOps>, config: ConnectionConfig) -> Arc<Self> {
        Arc::new(Self {
            adapter,
            config,
            subscriptions: Mutex::new(SubscriptionSet::new()),
            io: Mutex::new(None),
            connected: AtomicBool::new(false),
            state_changed: EventHub::new(),
            errors: EventHub::new(),
            pong_pending: Mutex::new(None),
            lifecycle: Mutex::new(None),
        })
    }

    pub fn adapter(&self) -> &Arc<dyn AdapterOps> {
        &self.adapter
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn on_state_change<F>(&self, handler: F) -> HubSubscription
    where
        F: Fn(&ConnectionStateChanged) + Send + Sync + 'static,
    {
        self.state_changed.subscribe(handler)
    }

    pub fn on_error<F>(&self, handler: F) -> HubSubscription
    where
        F: Fn(&DataError) + Send + Sync + 'static,
    {
        self.errors.subscribe(handler)
    }

    /// Start the reconnecting supervisor. Idempotent while running.
    pub fn connect(self: &Arc<Self>) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_some() {
            return;
        }

        let (trigger, token) = shutdown_channel();
        let this = Arc::clone(self);
        let supervisor = tokio::spawn(async move { this.supervise(token).await });
        *lifecycle = Some(Lifecycle {
            trigger,
            supervisor,
        });
    }

    /// Cancel the supervisor and close the socket gracefully. Lifecycle
    /// tasks are joined with a bounded deadline; a pending pong promise is
    /// completed with cancellation by dropping it.
    pub async fn disconnect(&self) {
        let Some(Lifecycle {
            trigger,
            supervisor,
        }) = self.lifecycle.lock().take()
        else {
            return;
        };

        trigger.cancel();
        if timeout(JOIN_TIMEOUT, supervisor).await.is_err() {
            warn!(
                exchange = %self.adapter.exchange(),
                "connection supervisor did not stop within the join deadline"
            );
        }

        *self.pong_pending.lock() = None;
        self.set_connected(false, "Disconnected");
    }

    /// Add `(instrument, topic)` pairs to the canonical subscription memory
    /// and emit wire messages for the genuinely new pairs only.
    pub async fn subscribe(
        &self,
        instruments: &[InstrumentId],
        topics: &[Topic],
    ) -> Result<(), DataError> {
        let (delta, snapshot) = {
            let mut subscriptions = self.subscriptions.lock();
            let delta = subscriptions.add_all(instruments, topics);
            (delta, subscriptions.clone())
        };

        if delta.is_empty() {
            return Ok(());
        }

        match self.current_io() {
            // Not connected yet: the supervisor replays the full set on
            // (re)connect.
            None => Ok(()),
            Some(io) => self.adapter.send_subscribe(&io, &snapshot, &delta).await,
        }
    }

    /// Remove pairs from the canonical memory and emit unsubscriptions for
    /// the pairs that were present.
    pub async fn unsubscribe(
        &self,
        instruments: &[InstrumentId],
        topics: &[Topic],
    ) -> Result<(), DataError> {
        let (removed, snapshot) = {
            let mut subscriptions = self.subscriptions.lock();
            let removed = subscriptions.remove_all(instruments, topics);
            (removed, subscriptions.clone())
        };

        if removed.is_empty() {
            return Ok(());
        }

        match self.current_io() {
            None => Ok(()),
            Some(io) => self.adapter.send_unsubscribe(&io, &snapshot, &removed).await,
        }
    }

    /// Send a raw text frame on the live socket.
    pub fn send(&self, text: String) -> Result<(), DataError> {
        match self.current_io() {
            Some(io) => io.send_text(text),
            None => Err(DataError::Socket(SocketError::Terminated(
                "not connected".into(),
            ))),
        }
    }

    pub fn subscription_snapshot(&self) -> SubscriptionSet {
        self.subscriptions.lock().clone()
    }

    fn current_io(&self) -> Option<AdapterIo> {
        self.io.lock().clone()
    }

    fn set_connected(&self, connected: bool, reason: &str) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            self.state_changed.publish(&ConnectionStateChanged {
                exchange: self.adapter.exchange(),
                connected,
                reason: SmolStr::new(reason),
            });
        }
    }

    async fn supervise(self: Arc<Self>, token: ShutdownToken) {
        let mut attempt: usize = 0;

        loop {
            if token.is_cancelled() {
                break;
            }

            match self.run_session(&token, &mut attempt).await {
                Ok(()) => break,
                Err(session_error) => {
                    self.end_session();
                    self.set_connected(false, "Connection Lost");

                    if token.is_cancelled() {
                        break;
                    }

                    let delay = self.config.retry.delay(attempt);
                    attempt += 1;
                    warn!(
                        exchange = %self.adapter.exchange(),
                        error = %session_error,
                        ?delay,
                        attempt,
                        "connection lost, scheduling reconnect"
                    );

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        self.end_session();
        self.set_connected(false, "Disconnected");
    }

    /// One socket session: connect, authenticate, resubscribe, then pump
    /// frames until error, staleness, or cancellation. `Ok(())` only on
    /// cancellation.
    async fn run_session(
        &self,
        token: &ShutdownToken,
        attempt: &mut usize,
    ) -> Result<(), DataError> {
        let url = self.adapter.base_url().await?;
        let mut request = websocket::client_request(&url).map_err(DataError::Socket)?;
        self.adapter.configure_request(&mut request)?;

        let socket = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            connected = websocket::connect_request(request) => connected?,
        };

        // Session established: the backoff ladder restarts
        *attempt = 0;

        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let io = AdapterIo::new(tx);
        *self.io.lock() = Some(io.clone());
        let writer = tokio::spawn(write_loop(sink, rx));
        self.set_connected(true, "Connected");

        if self.adapter.has_private_stream() {
            match self.adapter.authenticate(&io).await {
                Ok(()) => self.adapter.subscribe_to_private_topics(&io).await?,
                Err(auth_error) => {
                    // Fatal for the private channel only; public topics
                    // continue and no reconnect is triggered for this.
                    error!(
                        exchange = %self.adapter.exchange(),
                        error = %auth_error,
                        "private stream authentication failed"
                    );
                    self.errors.publish(&auth_error);
                }
            }
        }

        let snapshot = self.subscriptions.lock().clone();
        if !snapshot.is_empty() {
            let all = snapshot.iter().collect::<Vec<_>>();
            self.adapter.send_subscribe(&io, &snapshot, &all).await?;
        }

        let (activity_tx, activity_rx) = watch::channel(Instant::now());

        let result = tokio::select! {
            received = self.receive_loop(stream, &activity_tx) => received,
            watchdog = self.heartbeat(&io, activity_rx) => Err(watchdog),
            forced = self.forced_ping(&io) => Err(forced),
            _ = token.cancelled() => {
                let _ = io.send(normal_close());
                Ok(())
            }
        };

        self.end_session();
        drop(io);
        // With every sender gone the writer drains its queue (including any
        // close frame) and exits; bound the wait regardless.
        let _ = timeout(JOIN_TIMEOUT, writer).await;

        result
    }

    /// Clear per-session shared state.
    fn end_session(&self) {
        *self.io.lock() = None;
        *self.pong_pending.lock() = None;
    }

    async fn receive_loop(
        &self,
        mut stream: WsStream,
        activity: &watch::Sender<Instant>,
    ) -> Result<(), DataError> {
        while let Some(frame) = stream.next().await {
            let message = frame.map_err(SocketError::from)?;

            // Any inbound frame, pongs included, resets the watchdog
            let _ = activity.send(Instant::now());

            match message {
                WsMessage::Text(text) => self.handle_payload(Bytes::from(text)),
                WsMessage::Binary(payload) => self.handle_payload(payload),
                WsMessage::Pong(_) => self.set_pong_received(),
                // tungstenite answers pings internally
                WsMessage::Ping(_) => {}
                WsMessage::Close(frame) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .unwrap_or_default();
                    return Err(SocketError::Terminated(reason).into());
                }
                WsMessage::Frame(_) => {}
            }
        }

        Err(SocketError::Terminated("stream ended".into()).into())
    }

    fn handle_payload(&self, payload: Bytes) {
        // A venue pong satisfies the watchdog and is not processed further
        if self.adapter.is_pong_message(&payload) {
            self.set_pong_received();
            return;
        }

        if let Err(parse_error) = self.adapter.process_message(&payload) {
            debug!(
                exchange = %self.adapter.exchange(),
                error = %parse_error,
                "message processing failed"
            );
            self.errors.publish(&parse_error);
        }
    }

    fn set_pong_received(&self) {
        if let Some(pending) = self.pong_pending.lock().take() {
            let _ = pending.send(());
        }
    }

    /// Inactivity watchdog: after `inactivity_timeout` without inbound
    /// frames, emit the venue ping and await a pong within `ping_timeout`;
    /// on miss, close the socket as stale. Only one ping is in flight at a
    /// time. Resolves only with the error that ends the session.
    async fn heartbeat(
        &self,
        io: &AdapterIo,
        mut activity: watch::Receiver<Instant>,
    ) -> DataError {
        let Some(inactivity) = self
            .config
            .inactivity_timeout
            .or_else(|| self.adapter.inactivity_timeout())
        else {
            return std::future::pending().await;
        };
        let ping_timeout = self.config.ping_timeout.unwrap_or_else(|| self.adapter.ping_timeout());

        loop {
            let deadline = *activity.borrow_and_update() + inactivity;
            if Instant::now() < deadline {
                tokio::select! {
                    changed = activity.changed() => {
                        if changed.is_err() {
                            // Session already unwinding
                            return std::future::pending().await;
                        }
                    }
                    _ = sleep_until(deadline) => {}
                }
                continue;
            }

            // Idle past the window: single in-flight ping
            let (pong_tx, pong_rx) = oneshot::channel();
            *self.pong_pending.lock() = Some(pong_tx);

            let ping = self
                .adapter
                .ping_message()
                .unwrap_or_else(|| WsMessage::Ping(Bytes::new()));
            if io.send(ping).is_err() {
                return SocketError::Terminated("writer task gone".into()).into();
            }

            match timeout(ping_timeout, pong_rx).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => {
                    warn!(
                        exchange = %self.adapter.exchange(),
                        "pong deadline missed, closing stale connection"
                    );
                    let _ = io.send(stale_connection_close());
                    return SocketError::Stale.into();
                }
            }
        }
    }

    /// Unconditional ping cadence for venues that heartbeat regardless of
    /// activity. Resolves only when the writer is gone.
    async fn forced_ping(&self, io: &AdapterIo) -> DataError {
        let Some(interval) = self.adapter.forced_ping_interval() else {
            return std::future::pending().await;
        };

        loop {
            sleep(interval).await;
            let Some(ping) = self.adapter.ping_message() else {
                continue;
            };
            if io.send(ping).is_err() {
                return SocketError::Terminated("writer task gone".into()).into();
            }
        }
    }
}

/// Forward queued outbound frames onto the socket sink until every sender
/// is gone, then close the socket.
async fn write_loop(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<WsMessage>) {
    while let Some(message) = rx.recv().await {
        let is_close = matches!(message, WsMessage::Close(_));
        if sink.send(message).await.is_err() || is_close {
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use url::Url;

    #[derive(Debug, Default)]
    struct InertAdapter;

    #[async_trait]
    impl AdapterOps for InertAdapter {
        fn exchange(&self) -> ExchangeId {
            ExchangeId::Mock
        }

        async fn base_url(&self) -> Result<Url, DataError> {
            Ok(Url::parse("wss://localhost:1/ws").expect("static url"))
        }

        async fn send_subscribe(
            &self,
            _io: &AdapterIo,
            _set: &SubscriptionSet,
            _delta: &[(InstrumentId, Topic)],
        ) -> Result<(), DataError> {
            Ok(())
        }

        async fn send_unsubscribe(
            &self,
            _io: &AdapterIo,
            _set: &SubscriptionSet,
            _removed: &[(InstrumentId, Topic)],
        ) -> Result<(), DataError> {
            Ok(())
        }

        fn process_message(&self, _payload: &Bytes) -> Result<(), DataError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_is_memorized() {
        let connection = ConnectionCore::new(Arc::new(InertAdapter), ConnectionConfig::default());

        connection
            .subscribe(&[InstrumentId(1)], &[Topic::Trades, Topic::DepthUpdates])
            .await
            .unwrap();
        // Idempotent repeat
        connection
            .subscribe(&[InstrumentId(1)], &[Topic::Trades])
            .await
            .unwrap();

        let snapshot = connection.subscription_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(InstrumentId(1), Topic::DepthUpdates));
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let connection = ConnectionCore::new(Arc::new(InertAdapter), ConnectionConfig::default());
        assert!(connection.send("hello".into()).is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_pair_is_noop() {
        let connection = ConnectionCore::new(Arc::new(InertAdapter), ConnectionConfig::default());
        connection
            .unsubscribe(&[InstrumentId(9)], &[Topic::Trades])
            .await
            .unwrap();
        assert!(connection.subscription_snapshot().is_empty());
    }

    #[test]
    fn test_state_change_dedup() {
        let connection = ConnectionCore::new(Arc::new(InertAdapter), ConnectionConfig::default());
        let transitions = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&transitions);
        connection.on_state_change(move |event: &ConnectionStateChanged| {
            sink.lock().push((event.connected, event.reason.clone()));
        });

        connection.set_connected(true, "Connected");
        connection.set_connected(true, "Connected");
        connection.set_connected(false, "Connection Lost");
        connection.set_connected(false, "Disconnected");

        let transitions = transitions.lock();
        assert_eq!(
            *transitions,
            vec![
                (true, SmolStr::new("Connected")),
                (false, SmolStr::new("Connection Lost")),
            ]
        );
    }
}
