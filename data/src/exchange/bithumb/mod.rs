//! Bithumb adapter.
//!
//! The venue overwrites the connection's subscriptions on every request, so
//! each subscribe resubmits the complete ordered array. Heartbeat is a
//! fire-and-forget `PING` text frame every 30 seconds with no pong
//! matching; the private `myOrder` channel authenticates with an HS256 JWT
//! handshake header.

use crate::adapter::{AdapterIo, AdapterOps};
use crate::error::DataError;
use crate::event::{chunk_events, EventHeader, MarketDataEventKind, PriceLevelEntry};
use crate::feed::EventDispatcher;
use crate::instrument_cache::SymbolCache;
use crate::order::{ClientOrderId, OrderStatus, OrderStatusReport};
use crate::subscription::{SubscriptionSet, Topic};
use arara_integration::auth::jwt_hs256;
use arara_integration::protocol::websocket::{WsMessage, WsRequest};
use arara_integration::time::now_epoch_ms;
use arara_integration::SocketError;
use arara_markets::{
    ExchangeId, InstrumentId, InstrumentRepository, ProductType, Quantity, Side,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use smol_str::SmolStr;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

pub mod message;

use message::{
    parse_ask_bid, BithumbMyOrder, BithumbOrderbook, BithumbTrade, TypeProbe,
};

/// Bithumb WebSocket url.
pub const WS_BASE_URL_BITHUMB: &str = "wss://ws-api.bithumb.com/websocket/v1";

/// Manual heartbeat cadence.
pub const BITHUMB_PING_INTERVAL: Duration = Duration::from_secs(30);

/// API credentials for the private `myOrder` channel.
#[derive(Clone)]
pub struct BithumbCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for BithumbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BithumbCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Bithumb [`AdapterOps`] implementation.
pub struct BithumbAdapter {
    repository: Arc<dyn InstrumentRepository>,
    dispatcher: Arc<EventDispatcher>,
    symbols: SymbolCache,
    credentials: Option<BithumbCredentials>,
    sequence: AtomicU64,
}

impl fmt::Debug for BithumbAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BithumbAdapter")
            .field("private", &self.credentials.is_some())
            .finish()
    }
}

impl BithumbAdapter {
    pub fn new(
        repository: Arc<dyn InstrumentRepository>,
        dispatcher: Arc<EventDispatcher>,
        credentials: Option<BithumbCredentials>,
    ) -> Self {
        Self {
            symbols: SymbolCache::new(
                ExchangeId::Bithumb,
                ProductType::Spot,
                Arc::clone(&repository),
            ),
            repository,
            dispatcher,
            credentials,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn channel_name(topic: Topic) -> Option<&'static str> {
        match topic {
            Topic::BookSnapshots => Some("orderbook"),
            Topic::Trades => Some("trade"),
            Topic::PrivateOrders => Some("myOrder"),
            Topic::BestQuotes | Topic::DepthUpdates => None,
        }
    }

    /// Build the complete ordered subscription array from the canonical
    /// set: the venue overwrites prior subscriptions on every request.
    fn full_subscription_frame(&self, set: &SubscriptionSet) -> Result<String, DataError> {
        let mut codes_by_channel: Vec<(&'static str, Vec<String>)> = Vec::new();

        for (instrument_id, topic) in set.iter() {
            let Some(channel) = Self::channel_name(topic) else {
                return Err(DataError::UnsupportedTopic {
                    exchange: ExchangeId::Bithumb,
                    topic,
                });
            };

            let instrument = self
                .repository
                .get_by_id(instrument_id)
                .ok_or_else(|| DataError::UnknownInstrument(instrument_id.to_string()))?;

            match codes_by_channel
                .iter_mut()
                .find(|(name, _)| *name == channel)
            {
                Some((_, codes)) => codes.push(instrument.symbol.to_string()),
                None => codes_by_channel.push((channel, vec![instrument.symbol.to_string()])),
            }
        }

        let mut frame = vec![json!({ "ticket": Uuid::new_v4().to_string() })];
        for (channel, codes) in codes_by_channel {
            frame.push(json!({ "type": channel, "codes": codes }));
        }
        frame.push(json!({ "format": "DEFAULT" }));

        serde_json::to_string(&frame)
            .map_err(|error| DataError::Socket(SocketError::Serialize(error.to_string())))
    }

    fn on_orderbook(&self, payload: &Bytes) -> Result<(), DataError> {
        let book = serde_json::from_slice::<BithumbOrderbook<'_>>(payload)
            .map_err(|error| DataError::parse(error, payload))?;

        let Some(instrument_id) = self.symbols.resolve(book.code) else {
            return Ok(());
        };

        let mut entries = Vec::with_capacity(book.orderbook_units.len() * 2);
        for unit in &book.orderbook_units {
            entries.push(PriceLevelEntry::new(Side::Buy, unit.bid_price, unit.bid_size));
            entries.push(PriceLevelEntry::new(Side::Sell, unit.ask_price, unit.ask_size));
        }

        let sequence = self.next_sequence();
        let header = EventHeader {
            sequence,
            prev_sequence: sequence.saturating_sub(1),
            timestamp: book.timestamp,
            instrument_id,
            exchange: ExchangeId::Bithumb,
            topic_id: Topic::BookSnapshots.id(),
        };
        for event in chunk_events(
            header,
            MarketDataEventKind::Snapshot,
            MarketDataEventKind::Update,
            &entries,
        ) {
            self.dispatcher.publish_market_data(&event);
        }
        Ok(())
    }

    fn on_trade(&self, payload: &Bytes) -> Result<(), DataError> {
        let trade = serde_json::from_slice::<BithumbTrade<'_>>(payload)
            .map_err(|error| DataError::parse(error, payload))?;

        let Some(instrument_id) = self.symbols.resolve(trade.code) else {
            return Ok(());
        };
        let Some(side) = parse_ask_bid(trade.ask_bid) else {
            return Ok(());
        };

        let sequence = trade.sequential_id.unwrap_or_else(|| self.next_sequence());
        let header = EventHeader {
            sequence,
            prev_sequence: sequence.saturating_sub(1),
            timestamp: trade.timestamp,
            instrument_id,
            exchange: ExchangeId::Bithumb,
            topic_id: Topic::Trades.id(),
        };
        let entry = PriceLevelEntry::new(side, trade.trade_price, trade.trade_volume);
        self.dispatcher
            .publish_market_data(&header.single(MarketDataEventKind::Trade, &[entry]));
        Ok(())
    }

    fn on_my_order(&self, payload: &Bytes) -> Result<(), DataError> {
        let order = serde_json::from_slice::<BithumbMyOrder<'_>>(payload)
            .map_err(|error| DataError::parse(error, payload))?;

        let Some(instrument_id) = self.symbols.resolve(order.code) else {
            return Ok(());
        };
        let Some(side) = parse_ask_bid(order.ask_bid) else {
            return Ok(());
        };

        let leaves = order.remaining_volume.unwrap_or(Quantity::ZERO);
        let report = OrderStatusReport {
            client_order_id: ClientOrderId(
                order
                    .identifier
                    .and_then(|identifier| identifier.parse().ok())
                    .unwrap_or_default(),
            ),
            exchange_order_id: order.uuid.map(SmolStr::new),
            execution_id: order.trade_uuid.map(SmolStr::new),
            instrument_id,
            side,
            status: map_order_state(order.state, leaves),
            price: order.price.unwrap_or(arara_markets::Price::ZERO),
            quantity: order.volume.unwrap_or(Quantity::ZERO),
            last_price: order.trade_price.unwrap_or(arara_markets::Price::ZERO),
            last_quantity: order.trade_volume.unwrap_or(Quantity::ZERO),
            leaves_quantity: leaves,
            timestamp: order.timestamp,
        };
        self.dispatcher.publish_order_status(&report);
        Ok(())
    }
}

fn map_order_state(state: &str, leaves: Quantity) -> OrderStatus {
    match state {
        "wait" | "watch" => OrderStatus::New,
        "trade" => {
            if leaves.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            }
        }
        "done" => OrderStatus::Filled,
        "cancel" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    }
}

#[async_trait]
impl AdapterOps for BithumbAdapter {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Bithumb
    }

    async fn base_url(&self) -> Result<Url, DataError> {
        Url::parse(WS_BASE_URL_BITHUMB)
            .map_err(|error| DataError::Socket(SocketError::Url(error)))
    }

    fn configure_request(&self, request: &mut WsRequest) -> Result<(), DataError> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };

        let token = jwt_hs256(
            &credentials.access_key,
            credentials.secret_key.as_bytes(),
            now_epoch_ms(),
        )
        .map_err(DataError::Socket)?;

        let value = format!("Bearer {token}")
            .parse()
            .map_err(|_| DataError::Socket(SocketError::Auth("invalid jwt header".into())))?;
        request.headers_mut().insert("authorization", value);
        Ok(())
    }

    fn has_private_stream(&self) -> bool {
        self.credentials.is_some()
    }

    async fn send_subscribe(
        &self,
        io: &AdapterIo,
        set: &SubscriptionSet,
        _delta: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        if set.is_empty() {
            return Ok(());
        }
        io.send_text(self.full_subscription_frame(set)?)
    }

    async fn send_unsubscribe(
        &self,
        io: &AdapterIo,
        set: &SubscriptionSet,
        _removed: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        // No unsubscribe verb: resubmitting the remaining set overwrites
        // the venue-side subscription state.
        io.send_text(self.full_subscription_frame(set)?)
    }

    fn process_message(&self, payload: &Bytes) -> Result<(), DataError> {
        let probe = serde_json::from_slice::<TypeProbe<'_>>(payload)
            .map_err(|error| DataError::parse(error, payload))?;

        match probe.message_type {
            Some("orderbook") => self.on_orderbook(payload),
            Some("trade") => self.on_trade(payload),
            Some("myOrder") => self.on_my_order(payload),
            // Status/keep-alive frames ({"status":"UP"}) and unknown types
            other => {
                debug!(message_type = ?other, "unhandled frame type");
                Ok(())
            }
        }
    }

    fn ping_message(&self) -> Option<WsMessage> {
        Some(WsMessage::text("PING"))
    }

    /// Manual heartbeat without pong matching: the inactivity watchdog is
    /// disabled and the forced-ping task carries liveness.
    fn inactivity_timeout(&self) -> Option<Duration> {
        None
    }

    fn forced_ping_interval(&self) -> Option<Duration> {
        Some(BITHUMB_PING_INTERVAL)
    }
}
