//! Binance adapter: spot and USD-margined perpetual futures.
//!
//! Public topics map onto the combined stream (`aggTrade`, `bookTicker`,
//! incremental depth). Depth deltas are handed whole to the per-instrument
//! [`BookSynchronizer`]; every subscription ack re-triggers synchronization
//! of all managed books. The private variant connects through a rotating
//! listen key and normalises `executionReport`s.

use crate::adapter::{AdapterIo, AdapterOps};
use crate::books::pool::EntryPool;
use crate::books::sync::{BookSynchronizer, BufferedDepthUpdate};
use crate::error::DataError;
use crate::event::{EventHeader, MarketDataEventKind, PriceLevelEntry};
use crate::feed::EventDispatcher;
use crate::instrument_cache::SymbolCache;
use crate::order::{ClientOrderId, OrderStatus, OrderStatusReport};
use crate::snapshot::{AuthTokenIssuer, SnapshotFetcher};
use crate::subscription::{SubscriptionSet, Topic};
use arara_integration::time::now_epoch_ms;
use arara_integration::SocketError;
use arara_markets::{
    ExchangeId, InstrumentId, InstrumentRepository, ProductType, Side,
};
use async_trait::async_trait;
use bytes::Bytes;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use serde_json::json;
use smol_str::format_smolstr;
use std::fmt;
use std::sync::Arc;
use url::Url;

pub mod message;

use message::{
    is_subscription_ack, parse_levels_into, BinanceAggTrade, BinanceBookTicker,
    BinanceDepthUpdate, BinanceExecutionReport, CombinedFrame, EventTypeProbe,
};

/// Binance spot WebSocket root.
pub const WS_BASE_URL_BINANCE_SPOT: &str = "wss://stream.binance.com:9443";

/// Binance USD-margined futures WebSocket root.
pub const WS_BASE_URL_BINANCE_FUTURES: &str = "wss://fstream.binance.com";

/// Binance spot / futures [`AdapterOps`] implementation.
pub struct BinanceAdapter {
    product: ProductType,
    repository: Arc<dyn InstrumentRepository>,
    dispatcher: Arc<EventDispatcher>,
    symbols: SymbolCache,
    pool: Arc<EntryPool>,
    books: RwLock<FnvHashMap<InstrumentId, Arc<BookSynchronizer>>>,
    fetcher: Option<Arc<dyn SnapshotFetcher>>,
    token_issuer: Option<Arc<dyn AuthTokenIssuer>>,
    snapshot_limit: Option<u32>,
}

impl fmt::Debug for BinanceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceAdapter")
            .field("product", &self.product)
            .field("private", &self.token_issuer.is_some())
            .field("books", &self.books.read().len())
            .finish()
    }
}

impl BinanceAdapter {
    /// Public market data adapter.
    pub fn public(
        product: ProductType,
        repository: Arc<dyn InstrumentRepository>,
        fetcher: Arc<dyn SnapshotFetcher>,
        pool: Arc<EntryPool>,
        dispatcher: Arc<EventDispatcher>,
        snapshot_limit: Option<u32>,
    ) -> Self {
        Self {
            product,
            symbols: SymbolCache::new(ExchangeId::Binance, product, Arc::clone(&repository)),
            repository,
            dispatcher,
            pool,
            books: RwLock::new(FnvHashMap::default()),
            fetcher: Some(fetcher),
            token_issuer: None,
            snapshot_limit,
        }
    }

    /// Private user-data adapter connecting through a rotating listen key.
    ///
    /// Carries no depth books: the pool stays empty and no snapshot limit
    /// applies.
    pub fn private(
        product: ProductType,
        repository: Arc<dyn InstrumentRepository>,
        token_issuer: Arc<dyn AuthTokenIssuer>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            product,
            symbols: SymbolCache::new(ExchangeId::Binance, product, Arc::clone(&repository)),
            repository,
            dispatcher,
            pool: EntryPool::new(),
            books: RwLock::new(FnvHashMap::default()),
            fetcher: None,
            token_issuer: Some(token_issuer),
            snapshot_limit: None,
        }
    }

    fn channel_name(topic: Topic) -> Option<&'static str> {
        match topic {
            Topic::Trades => Some("aggTrade"),
            Topic::BestQuotes => Some("bookTicker"),
            Topic::DepthUpdates => Some("depth@100ms"),
            Topic::BookSnapshots | Topic::PrivateOrders => None,
        }
    }

    fn stream_params(
        &self,
        pairs: &[(InstrumentId, Topic)],
    ) -> Result<Vec<String>, DataError> {
        let mut params = Vec::with_capacity(pairs.len());
        for &(instrument_id, topic) in pairs {
            if topic == Topic::PrivateOrders {
                // Listen-key streams push the private topics without a
                // subscription message
                if self.token_issuer.is_some() {
                    continue;
                }
                return Err(DataError::UnsupportedTopic {
                    exchange: ExchangeId::Binance,
                    topic,
                });
            }

            let Some(channel) = Self::channel_name(topic) else {
                return Err(DataError::UnsupportedTopic {
                    exchange: ExchangeId::Binance,
                    topic,
                });
            };

            let instrument = self
                .repository
                .get_by_id(instrument_id)
                .ok_or_else(|| DataError::UnknownInstrument(instrument_id.to_string()))?;

            params.push(format!("{}@{}", instrument.symbol.to_lowercase(), channel));

            if topic == Topic::DepthUpdates {
                self.ensure_book(instrument_id)?;
            }
        }
        Ok(params)
    }

    fn ensure_book(&self, instrument_id: InstrumentId) -> Result<(), DataError> {
        if self.books.read().contains_key(&instrument_id) {
            return Ok(());
        }

        let fetcher = self.fetcher.clone().ok_or_else(|| {
            DataError::Configuration(
                "depth subscription requires a snapshot fetcher".into(),
            )
        })?;
        let instrument = self
            .repository
            .get_by_id(instrument_id)
            .ok_or_else(|| DataError::UnknownInstrument(instrument_id.to_string()))?
            .clone();

        let synchronizer = BookSynchronizer::new(
            instrument,
            fetcher,
            Arc::clone(&self.dispatcher),
            self.snapshot_limit,
        );
        self.books.write().insert(instrument_id, synchronizer);
        Ok(())
    }

    fn start_all_books(&self) {
        for book in self.books.read().values() {
            book.start_sync();
        }
    }

    fn on_depth(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let update = serde_json::from_str::<BinanceDepthUpdate<'_>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        let Some(instrument_id) = self.symbols.resolve(update.symbol) else {
            return Ok(());
        };
        let Some(book) = self.books.read().get(&instrument_id).cloned() else {
            return Ok(());
        };

        let mut entries = self.pool.rent(64);
        parse_levels_into(update.bids, Side::Buy, &mut entries)
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;
        parse_levels_into(update.asks, Side::Sell, &mut entries)
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        book.on_depth_update(BufferedDepthUpdate {
            first_update_id: update.first_update_id,
            last_update_id: update.last_update_id,
            prev_last_update_id: update.prev_last_update_id.unwrap_or_default(),
            event_time: update.event_time,
            entries,
        });
        Ok(())
    }

    fn on_agg_trade(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let trade = serde_json::from_str::<BinanceAggTrade<'_>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        let Some(instrument_id) = self.symbols.resolve(trade.symbol) else {
            return Ok(());
        };

        let header = EventHeader {
            sequence: trade.trade_id,
            prev_sequence: trade.trade_id,
            timestamp: trade.trade_time,
            instrument_id,
            exchange: ExchangeId::Binance,
            topic_id: Topic::Trades.id(),
        };
        let entry =
            PriceLevelEntry::new(trade.aggressor_side(), trade.price, trade.quantity);
        self.dispatcher
            .publish_market_data(&header.single(MarketDataEventKind::Trade, &[entry]));
        Ok(())
    }

    fn on_book_ticker(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let ticker = serde_json::from_str::<BinanceBookTicker<'_>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        let Some(instrument_id) = self.symbols.resolve(ticker.symbol) else {
            return Ok(());
        };

        let header = EventHeader {
            sequence: ticker.update_id,
            prev_sequence: ticker.update_id,
            timestamp: ticker.event_time.unwrap_or_else(now_epoch_ms),
            instrument_id,
            exchange: ExchangeId::Binance,
            topic_id: Topic::BestQuotes.id(),
        };
        // A zero size means the best level vanished: the entry is carried
        // verbatim and downstream applies level-delete semantics
        let entries = [
            PriceLevelEntry::new(Side::Buy, ticker.bid_price, ticker.bid_quantity),
            PriceLevelEntry::new(Side::Sell, ticker.ask_price, ticker.ask_quantity),
        ];
        self.dispatcher
            .publish_market_data(&header.single(MarketDataEventKind::Update, &entries));
        Ok(())
    }

    fn on_private_frame(&self, payload: &Bytes) -> Result<(), DataError> {
        let probe = serde_json::from_slice::<EventTypeProbe<'_>>(payload)
            .map_err(|error| DataError::parse(error, payload))?;

        if probe.event_type != Some("executionReport") {
            return Ok(());
        }

        let report = serde_json::from_slice::<BinanceExecutionReport<'_>>(payload)
            .map_err(|error| DataError::parse(error, payload))?;

        let Some(instrument_id) = self.symbols.resolve(report.symbol) else {
            return Ok(());
        };

        let side = match report.side {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => {
                return Err(DataError::parse(
                    format!("unknown order side: {other}"),
                    payload,
                ))
            }
        };

        let normalised = OrderStatusReport {
            client_order_id: ClientOrderId(report.client_order_id.parse().unwrap_or_default()),
            exchange_order_id: Some(format_smolstr!("{}", report.exchange_order_id)),
            execution_id: report
                .trade_id
                .filter(|trade_id| *trade_id >= 0)
                .map(|trade_id| format_smolstr!("{trade_id}")),
            instrument_id,
            side,
            status: map_order_status(report.order_status),
            price: report.price,
            quantity: report.quantity,
            last_price: report.last_price,
            last_quantity: report.last_quantity,
            leaves_quantity: report.quantity.saturating_sub(report.cumulative_quantity),
            timestamp: report.transaction_time,
        };
        self.dispatcher.publish_order_status(&normalised);
        Ok(())
    }
}

fn map_order_status(status: &str) -> OrderStatus {
    match status {
        "NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

#[async_trait]
impl AdapterOps for BinanceAdapter {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    async fn base_url(&self) -> Result<Url, DataError> {
        let root = match self.product {
            ProductType::Spot => WS_BASE_URL_BINANCE_SPOT,
            ProductType::PerpetualFuture => WS_BASE_URL_BINANCE_FUTURES,
        };

        let url = match &self.token_issuer {
            None => format!("{root}/stream"),
            Some(issuer) => {
                let listen_key = issuer.create_listen_key(self.product).await?;
                format!("{root}/ws/{listen_key}")
            }
        };

        Url::parse(&url).map_err(|error| DataError::Socket(SocketError::Url(error)))
    }

    fn has_private_stream(&self) -> bool {
        self.token_issuer.is_some()
    }

    async fn send_subscribe(
        &self,
        io: &AdapterIo,
        _set: &SubscriptionSet,
        delta: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        let params = self.stream_params(delta)?;
        if params.is_empty() {
            return Ok(());
        }

        let message = json!({
            "method": "SUBSCRIBE",
            "params": params,
            "id": now_epoch_ms(),
        });
        io.send_text(message.to_string())
    }

    async fn send_unsubscribe(
        &self,
        io: &AdapterIo,
        _set: &SubscriptionSet,
        removed: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        for &(instrument_id, topic) in removed {
            if topic == Topic::DepthUpdates {
                if let Some(book) = self.books.write().remove(&instrument_id) {
                    book.dispose();
                }
            }
        }

        let params = self.stream_params(removed)?;
        if params.is_empty() {
            return Ok(());
        }

        let message = json!({
            "method": "UNSUBSCRIBE",
            "params": params,
            "id": now_epoch_ms(),
        });
        io.send_text(message.to_string())
    }

    fn process_message(&self, payload: &Bytes) -> Result<(), DataError> {
        if let Ok(frame) = serde_json::from_slice::<CombinedFrame<'_>>(payload) {
            let Some(channel) = frame.channel() else {
                return Ok(());
            };

            return if channel.starts_with("depth") {
                self.on_depth(frame.data)
            } else if channel == "aggTrade" {
                self.on_agg_trade(frame.data)
            } else if channel == "bookTicker" {
                self.on_book_ticker(frame.data)
            } else {
                Ok(())
            };
        }

        if is_subscription_ack(payload) {
            self.start_all_books();
            return Ok(());
        }

        // Bare frames only arrive on the listen-key stream
        self.on_private_frame(payload)
    }

    // Server-initiated protocol pings are answered by the websocket layer
    fn is_pong_message(&self, _payload: &[u8]) -> bool {
        false
    }
}
