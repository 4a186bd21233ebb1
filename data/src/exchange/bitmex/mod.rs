//! BitMEX adapter.
//!
//! Single realtime endpoint for public and private tables. Private access
//! authenticates with an `authKeyExpires` HMAC frame; `orderBookL2_25`
//! assembles through the per-instrument id-keyed [`L2Book`].

use crate::adapter::{AdapterIo, AdapterOps};
use crate::error::DataError;
use crate::event::{chunk_events, EventHeader, MarketDataEventKind, PriceLevelEntry};
use crate::feed::EventDispatcher;
use crate::instrument_cache::SymbolCache;
use crate::order::{AuthStateChanged, ClientOrderId, OrderStatus, OrderStatusReport};
use crate::subscription::{SubscriptionSet, Topic};
use arara_integration::auth::websocket_auth_signature;
use arara_integration::protocol::websocket::WsMessage;
use arara_integration::time::{now_epoch_ms, now_epoch_sec};
use arara_integration::SocketError;
use arara_markets::{ExchangeId, InstrumentId, InstrumentRepository, ProductType, Quantity, Side};
use async_trait::async_trait;
use bytes::Bytes;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde_json::json;
use smol_str::SmolStr;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub mod book;
pub mod message;

use book::{L2Action, L2Book, L2Level};
use message::{
    parse_side, parse_timestamp_ms, BitmexBook10, BitmexExecution, BitmexL2Item, BitmexQuote,
    BitmexTrade, StatusFrame, TableFrame,
};

/// BitMEX realtime WebSocket url.
pub const WS_BASE_URL_BITMEX: &str = "wss://www.bitmex.com/realtime";

/// API credentials for the private tables.
#[derive(Clone)]
pub struct BitmexCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for BitmexCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmexCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// BitMEX [`AdapterOps`] implementation.
pub struct BitmexAdapter {
    repository: Arc<dyn InstrumentRepository>,
    dispatcher: Arc<EventDispatcher>,
    symbols: SymbolCache,
    books: RwLock<FnvHashMap<InstrumentId, Arc<L2Book>>>,
    credentials: Option<BitmexCredentials>,
    sequence: AtomicU64,
}

impl fmt::Debug for BitmexAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmexAdapter")
            .field("private", &self.credentials.is_some())
            .field("books", &self.books.read().len())
            .finish()
    }
}

impl BitmexAdapter {
    pub fn new(
        repository: Arc<dyn InstrumentRepository>,
        dispatcher: Arc<EventDispatcher>,
        credentials: Option<BitmexCredentials>,
    ) -> Self {
        Self {
            symbols: SymbolCache::new(
                ExchangeId::Bitmex,
                ProductType::PerpetualFuture,
                Arc::clone(&repository),
            ),
            repository,
            dispatcher,
            books: RwLock::new(FnvHashMap::default()),
            credentials,
            sequence: AtomicU64::new(0),
        }
    }

    fn table_name(topic: Topic) -> &'static str {
        match topic {
            Topic::Trades => "trade",
            Topic::BestQuotes => "quote",
            Topic::BookSnapshots => "orderBook10",
            Topic::DepthUpdates => "orderBookL2_25",
            Topic::PrivateOrders => "execution",
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn subscription_args(
        &self,
        pairs: &[(InstrumentId, Topic)],
    ) -> Result<Vec<String>, DataError> {
        let mut args = Vec::with_capacity(pairs.len());
        for &(instrument_id, topic) in pairs {
            if topic == Topic::PrivateOrders {
                // Subscribed through subscribe_to_private_topics after auth
                continue;
            }
            let instrument = self
                .repository
                .get_by_id(instrument_id)
                .ok_or_else(|| DataError::UnknownInstrument(instrument_id.to_string()))?;

            args.push(format!("{}:{}", Self::table_name(topic), instrument.symbol));

            if topic == Topic::DepthUpdates {
                // Resubscription clears the id map; the next partial rebuilds
                self.books
                    .write()
                    .entry(instrument_id)
                    .or_insert_with(|| Arc::new(L2Book::new(instrument_id)))
                    .clear();
            }
        }
        Ok(args)
    }

    fn on_quote(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let quotes = serde_json::from_str::<Vec<BitmexQuote<'_>>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        for quote in quotes {
            let Some(instrument_id) = self.symbols.resolve(quote.symbol) else {
                continue;
            };

            let mut entries = Vec::with_capacity(2);
            if let Some(price) = quote.bid_price {
                entries.push(PriceLevelEntry::new(
                    Side::Buy,
                    price,
                    quote.bid_size.unwrap_or(Quantity::ZERO),
                ));
            }
            if let Some(price) = quote.ask_price {
                entries.push(PriceLevelEntry::new(
                    Side::Sell,
                    price,
                    quote.ask_size.unwrap_or(Quantity::ZERO),
                ));
            }
            if entries.is_empty() {
                continue;
            }

            let sequence = self.next_sequence();
            let header = EventHeader {
                sequence,
                prev_sequence: sequence.saturating_sub(1),
                timestamp: parse_timestamp_ms(quote.timestamp).unwrap_or_else(now_epoch_ms),
                instrument_id,
                exchange: ExchangeId::Bitmex,
                topic_id: Topic::BestQuotes.id(),
            };
            self.dispatcher
                .publish_market_data(&header.single(MarketDataEventKind::Update, &entries));
        }
        Ok(())
    }

    fn on_trade(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let trades = serde_json::from_str::<Vec<BitmexTrade<'_>>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        let Some(first) = trades.first() else {
            return Ok(());
        };
        let Some(instrument_id) = self.symbols.resolve(first.symbol) else {
            return Ok(());
        };
        let frame_symbol = first.symbol;
        let timestamp = parse_timestamp_ms(first.timestamp).unwrap_or_else(now_epoch_ms);

        let mut entries = Vec::with_capacity(trades.len());
        for trade in &trades {
            // Frames are assumed single-symbol; anything else is dropped
            if trade.symbol != frame_symbol {
                warn!(
                    expected = frame_symbol,
                    got = trade.symbol,
                    "multi-symbol trade frame, extra symbol dropped"
                );
                continue;
            }
            let Some(side) = parse_side(trade.side) else {
                continue;
            };
            entries.push(PriceLevelEntry::new(side, trade.price, trade.size));
        }

        let sequence = self.next_sequence();
        let header = EventHeader {
            sequence,
            prev_sequence: sequence.saturating_sub(1),
            timestamp,
            instrument_id,
            exchange: ExchangeId::Bitmex,
            topic_id: Topic::Trades.id(),
        };
        for event in chunk_events(
            header,
            MarketDataEventKind::Trade,
            MarketDataEventKind::Trade,
            &entries,
        ) {
            self.dispatcher.publish_market_data(&event);
        }
        Ok(())
    }

    fn on_book10(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let books = serde_json::from_str::<Vec<BitmexBook10<'_>>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        for book in books {
            let Some(instrument_id) = self.symbols.resolve(book.symbol) else {
                continue;
            };

            let entries = book
                .bids()
                .map(|(price, size)| PriceLevelEntry::new(Side::Buy, price, size))
                .chain(
                    book.asks()
                        .map(|(price, size)| PriceLevelEntry::new(Side::Sell, price, size)),
                )
                .collect::<Vec<_>>();

            let sequence = self.next_sequence();
            let header = EventHeader {
                sequence,
                prev_sequence: sequence.saturating_sub(1),
                timestamp: parse_timestamp_ms(book.timestamp).unwrap_or_else(now_epoch_ms),
                instrument_id,
                exchange: ExchangeId::Bitmex,
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
        }
        Ok(())
    }

    fn on_l2(&self, action: &str, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let Some(action) = L2Action::parse(action) else {
            return Ok(());
        };
        let items = serde_json::from_str::<Vec<BitmexL2Item<'_>>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        let Some(first) = items.first() else {
            return Ok(());
        };
        let Some(instrument_id) = self.symbols.resolve(first.symbol) else {
            return Ok(());
        };
        let frame_symbol = first.symbol;

        let book = Arc::clone(
            self.books
                .write()
                .entry(instrument_id)
                .or_insert_with(|| Arc::new(L2Book::new(instrument_id))),
        );

        let mut levels = Vec::with_capacity(items.len());
        for item in &items {
            if item.symbol != frame_symbol {
                warn!(
                    expected = frame_symbol,
                    got = item.symbol,
                    "multi-symbol L2 frame, extra symbol dropped"
                );
                continue;
            }
            let Some(side) = parse_side(item.side) else {
                continue;
            };
            levels.push(L2Level {
                id: item.id,
                side,
                price: item.price,
                size: item.size,
            });
        }

        for event in book.apply(action, &levels, now_epoch_ms()) {
            self.dispatcher.publish_market_data(&event);
        }
        Ok(())
    }

    fn on_execution(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let executions = serde_json::from_str::<Vec<BitmexExecution<'_>>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        for execution in executions {
            let Some(instrument_id) = self.symbols.resolve(execution.symbol) else {
                continue;
            };
            let Some(side) = parse_side(execution.side) else {
                continue;
            };

            let quantity = execution.order_quantity.unwrap_or(Quantity::ZERO);
            let report = OrderStatusReport {
                client_order_id: ClientOrderId(
                    execution
                        .client_order_id
                        .and_then(|id| id.parse().ok())
                        .unwrap_or_default(),
                ),
                exchange_order_id: execution.order_id.map(SmolStr::new),
                execution_id: execution.execution_id.map(SmolStr::new),
                instrument_id,
                side,
                status: map_order_status(execution.order_status),
                price: execution.price.unwrap_or(arara_markets::Price::ZERO),
                quantity,
                last_price: execution.last_price.unwrap_or(arara_markets::Price::ZERO),
                last_quantity: execution.last_quantity.unwrap_or(Quantity::ZERO),
                leaves_quantity: execution.leaves_quantity.unwrap_or(Quantity::ZERO),
                timestamp: parse_timestamp_ms(execution.timestamp).unwrap_or_else(now_epoch_ms),
            };
            self.dispatcher.publish_order_status(&report);
        }
        Ok(())
    }

    fn on_status_frame(&self, frame: &StatusFrame<'_>) {
        if !frame.is_auth_response() {
            return;
        }

        let authenticated = frame.success == Some(true) && frame.error.is_none();
        if !authenticated {
            warn!(error = ?frame.error, "authentication rejected");
        }
        self.dispatcher.publish_auth_state(&AuthStateChanged {
            exchange: ExchangeId::Bitmex,
            authenticated,
        });
    }
}

fn map_order_status(status: &str) -> OrderStatus {
    match status {
        "New" => OrderStatus::New,
        "PartiallyFilled" => OrderStatus::PartiallyFilled,
        "Filled" => OrderStatus::Filled,
        "Canceled" => OrderStatus::Cancelled,
        "Rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

#[async_trait]
impl AdapterOps for BitmexAdapter {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Bitmex
    }

    async fn base_url(&self) -> Result<Url, DataError> {
        Url::parse(WS_BASE_URL_BITMEX)
            .map_err(|error| DataError::Socket(SocketError::Url(error)))
    }

    fn has_private_stream(&self) -> bool {
        self.credentials.is_some()
    }

    async fn authenticate(&self, io: &AdapterIo) -> Result<(), DataError> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };

        let signed = websocket_auth_signature(&credentials.api_secret, now_epoch_sec());
        let frame = json!({
            "op": "authKeyExpires",
            "args": [credentials.api_key, signed.expires, signed.signature],
        });
        io.send_text(frame.to_string())
    }

    async fn subscribe_to_private_topics(&self, io: &AdapterIo) -> Result<(), DataError> {
        let frame = json!({ "op": "subscribe", "args": ["execution"] });
        io.send_text(frame.to_string())
    }

    async fn send_subscribe(
        &self,
        io: &AdapterIo,
        _set: &SubscriptionSet,
        delta: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        let args = self.subscription_args(delta)?;
        if args.is_empty() {
            return Ok(());
        }
        let frame = json!({ "op": "subscribe", "args": args });
        io.send_text(frame.to_string())
    }

    async fn send_unsubscribe(
        &self,
        io: &AdapterIo,
        _set: &SubscriptionSet,
        removed: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        for &(instrument_id, topic) in removed {
            if topic == Topic::DepthUpdates {
                self.books.write().remove(&instrument_id);
            }
        }

        let args = self.subscription_args(removed)?;
        if args.is_empty() {
            return Ok(());
        }
        let frame = json!({ "op": "unsubscribe", "args": args });
        io.send_text(frame.to_string())
    }

    fn process_message(&self, payload: &Bytes) -> Result<(), DataError> {
        if let Ok(frame) = serde_json::from_slice::<TableFrame<'_>>(payload) {
            return match frame.table {
                "quote" => self.on_quote(frame.data),
                "trade" => self.on_trade(frame.data),
                "orderBook10" => self.on_book10(frame.data),
                "orderBookL2_25" => self.on_l2(frame.action, frame.data),
                "execution" => self.on_execution(frame.data),
                other => {
                    debug!(table = other, "unhandled table");
                    Ok(())
                }
            };
        }

        if let Ok(frame) = serde_json::from_slice::<StatusFrame<'_>>(payload) {
            self.on_status_frame(&frame);
            return Ok(());
        }

        // Welcome banner and other info frames
        Ok(())
    }

    fn ping_message(&self) -> Option<WsMessage> {
        Some(WsMessage::text("ping"))
    }

    fn is_pong_message(&self, payload: &[u8]) -> bool {
        payload == b"pong"
    }
}
