//! Adapter ownership and unified event dispatch.

use crate::adapter::AdapterOps;
use crate::connection::{ConnectionConfig, ConnectionCore};
use crate::event::MarketDataEvent;
use crate::order::{AuthStateChanged, Fill, OrderStatusReport};
use arara_integration::event::{EventHub, HubSubscription};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

/// Shared event hubs every adapter publishes into.
///
/// Fills are derived here: any status report carrying a traded quantity
/// also publishes a [`Fill`].
#[derive(Debug)]
pub struct EventDispatcher {
    pub market_data: EventHub<MarketDataEvent>,
    pub order_status: EventHub<OrderStatusReport>,
    pub fills: EventHub<Fill>,
    pub auth_state: EventHub<AuthStateChanged>,
}

impl EventDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            market_data: EventHub::new(),
            order_status: EventHub::new(),
            fills: EventHub::new(),
            auth_state: EventHub::new(),
        })
    }

    pub fn publish_market_data(&self, event: &MarketDataEvent) {
        self.market_data.publish(event);
    }

    pub fn publish_order_status(&self, report: &OrderStatusReport) {
        self.order_status.publish(report);
        if let Some(fill) = Fill::from_report(report) {
            self.fills.publish(&fill);
        }
    }

    pub fn publish_auth_state(&self, state: &AuthStateChanged) {
        self.auth_state.publish(state);
    }
}

/// Exclusively owns every venue adapter and its connection lifecycle.
#[derive(Debug)]
pub struct FeedHandler {
    dispatcher: Arc<EventDispatcher>,
    connections: Vec<Arc<ConnectionCore>>,
}

impl FeedHandler {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            dispatcher,
            connections: Vec::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Wrap an adapter in its own [`ConnectionCore`] and take ownership.
    pub fn attach(
        &mut self,
        adapter: Arc<dyn AdapterOps>,
        config: ConnectionConfig,
    ) -> Arc<ConnectionCore> {
        let connection = ConnectionCore::new(adapter, config);
        self.connections.push(Arc::clone(&connection));
        connection
    }

    pub fn connections(&self) -> &[Arc<ConnectionCore>] {
        &self.connections
    }

    pub fn connect_all(&self) {
        for connection in &self.connections {
            connection.connect();
        }
    }

    pub async fn disconnect_all(&self) {
        for connection in &self.connections {
            connection.disconnect().await;
        }
        info!(adapters = self.connections.len(), "feed disconnected");
    }

    /// Channel-backed stream of normalised market data events, for
    /// consumers that prefer `Stream` over callbacks. Dropping the stream
    /// deregisters its hub subscription.
    pub fn market_event_stream(&self) -> MarketEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self
            .dispatcher
            .market_data
            .subscribe(move |event: &MarketDataEvent| {
                // Receiver gone means the stream was dropped; the
                // subscription itself is removed by MarketEventStream::drop
                let _ = tx.send(*event);
            });

        MarketEventStream {
            dispatcher: Arc::clone(&self.dispatcher),
            subscription,
            inner: UnboundedReceiverStream::new(rx),
        }
    }
}

/// See [`FeedHandler::market_event_stream`].
#[derive(Debug)]
pub struct MarketEventStream {
    dispatcher: Arc<EventDispatcher>,
    subscription: HubSubscription,
    inner: UnboundedReceiverStream<MarketDataEvent>,
}

impl Stream for MarketEventStream {
    type Item = MarketDataEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for MarketEventStream {
    fn drop(&mut self) {
        self.dispatcher.market_data.unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventHeader, MarketDataEventKind};
    use arara_markets::{ExchangeId, InstrumentId, Price, Quantity, Side};
    use futures::StreamExt;
    use parking_lot::Mutex;
    use smol_str::SmolStr;

    fn report(last_quantity: i64) -> crate::order::OrderStatusReport {
        crate::order::OrderStatusReport {
            client_order_id: crate::order::ClientOrderId(5),
            exchange_order_id: Some(SmolStr::new("x")),
            execution_id: None,
            instrument_id: InstrumentId(1),
            side: Side::Buy,
            status: crate::order::OrderStatus::PartiallyFilled,
            price: Price::from_raw(10),
            quantity: Quantity::from_raw(10),
            last_price: Price::from_raw(10),
            last_quantity: Quantity::from_raw(last_quantity),
            leaves_quantity: Quantity::from_raw(10 - last_quantity),
            timestamp: 1,
        }
    }

    #[test]
    fn test_fill_derivation_from_status_reports() {
        let dispatcher = EventDispatcher::new();
        let fills = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fills);
        dispatcher.fills.subscribe(move |fill: &Fill| {
            sink.lock().push(*fill);
        });

        dispatcher.publish_order_status(&report(0));
        dispatcher.publish_order_status(&report(4));

        let fills = fills.lock();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, Quantity::from_raw(4));
    }

    #[tokio::test]
    async fn test_market_event_stream_delivers_and_unsubscribes() {
        let dispatcher = EventDispatcher::new();
        let feed = FeedHandler::new(Arc::clone(&dispatcher));

        let mut stream = feed.market_event_stream();
        assert_eq!(dispatcher.market_data.len(), 1);

        let header = EventHeader {
            sequence: 9,
            prev_sequence: 8,
            timestamp: 1,
            instrument_id: InstrumentId(1),
            exchange: ExchangeId::Mock,
            topic_id: 1,
        };
        dispatcher.publish_market_data(&header.single(MarketDataEventKind::Trade, &[]));

        let received = stream.next().await.unwrap();
        assert_eq!(received.sequence, 9);

        drop(stream);
        assert_eq!(dispatcher.market_data.len(), 0);
    }
}
