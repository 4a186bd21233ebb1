//! Coinone adapter.
//!
//! Every subscription is its own request frame; liveness is a manual
//! `{"request_type":"PING"}` every five minutes answered by the literal
//! `{"response_type":"PONG"}`.

use crate::adapter::{AdapterIo, AdapterOps};
use crate::error::DataError;
use crate::event::{chunk_events, EventHeader, MarketDataEventKind, PriceLevelEntry};
use crate::feed::EventDispatcher;
use crate::instrument_cache::SymbolCache;
use crate::subscription::{SubscriptionSet, Topic};
use arara_integration::protocol::websocket::WsMessage;
use arara_integration::SocketError;
use arara_markets::{ExchangeId, InstrumentId, InstrumentRepository, ProductType, Side};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub mod message;

use message::{is_pong, CoinoneOrderbook, CoinoneTrade, ResponseFrame};

/// Coinone WebSocket url.
pub const WS_BASE_URL_COINONE: &str = "wss://stream.coinone.co.kr";

/// Manual ping cadence.
pub const COINONE_PING_INTERVAL: Duration = Duration::from_secs(300);

/// Coinone [`AdapterOps`] implementation.
pub struct CoinoneAdapter {
    repository: Arc<dyn InstrumentRepository>,
    dispatcher: Arc<EventDispatcher>,
    symbols: SymbolCache,
    sequence: AtomicU64,
}

impl fmt::Debug for CoinoneAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoinoneAdapter").finish()
    }
}

impl CoinoneAdapter {
    pub fn new(
        repository: Arc<dyn InstrumentRepository>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            symbols: SymbolCache::new(
                ExchangeId::Coinone,
                ProductType::Spot,
                Arc::clone(&repository),
            ),
            repository,
            dispatcher,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn channel_name(topic: Topic) -> Option<&'static str> {
        match topic {
            Topic::BookSnapshots => Some("ORDERBOOK"),
            Topic::Trades => Some("TRADE"),
            Topic::BestQuotes | Topic::DepthUpdates | Topic::PrivateOrders => None,
        }
    }

    /// One independent request frame per `(instrument, topic)` pair.
    async fn send_requests(
        &self,
        io: &AdapterIo,
        request_type: &str,
        pairs: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        for &(instrument_id, topic) in pairs {
            let Some(channel) = Self::channel_name(topic) else {
                return Err(DataError::UnsupportedTopic {
                    exchange: ExchangeId::Coinone,
                    topic,
                });
            };

            let instrument = self
                .repository
                .get_by_id(instrument_id)
                .ok_or_else(|| DataError::UnknownInstrument(instrument_id.to_string()))?;

            let frame = json!({
                "request_type": request_type,
                "channel": channel,
                "topic": {
                    "quote_currency": instrument.quote.as_str(),
                    "target_currency": instrument.base.as_str(),
                },
            });
            io.send_text(frame.to_string())?;
        }
        Ok(())
    }

    fn on_orderbook(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let book = serde_json::from_str::<CoinoneOrderbook<'_>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        let Some(instrument_id) = self
            .symbols
            .resolve_pair(book.target_currency, book.quote_currency)
        else {
            return Ok(());
        };

        let entries = book
            .bids
            .iter()
            .map(|level| PriceLevelEntry::new(Side::Buy, level.price, level.qty))
            .chain(
                book.asks
                    .iter()
                    .map(|level| PriceLevelEntry::new(Side::Sell, level.price, level.qty)),
            )
            .collect::<Vec<_>>();

        let sequence = self.next_sequence();
        let header = EventHeader {
            sequence,
            prev_sequence: sequence.saturating_sub(1),
            timestamp: book.timestamp,
            instrument_id,
            exchange: ExchangeId::Coinone,
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

    fn on_trade(&self, data: &serde_json::value::RawValue) -> Result<(), DataError> {
        let trade = serde_json::from_str::<CoinoneTrade<'_>>(data.get())
            .map_err(|error| DataError::parse(error, data.get().as_bytes()))?;

        let Some(instrument_id) = self
            .symbols
            .resolve_pair(trade.target_currency, trade.quote_currency)
        else {
            return Ok(());
        };

        let side = if trade.is_seller_maker {
            Side::Buy
        } else {
            Side::Sell
        };

        let sequence = self.next_sequence();
        let header = EventHeader {
            sequence,
            prev_sequence: sequence.saturating_sub(1),
            timestamp: trade.timestamp,
            instrument_id,
            exchange: ExchangeId::Coinone,
            topic_id: Topic::Trades.id(),
        };
        let entry = PriceLevelEntry::new(side, trade.price, trade.qty);
        self.dispatcher
            .publish_market_data(&header.single(MarketDataEventKind::Trade, &[entry]));
        Ok(())
    }
}

#[async_trait]
impl AdapterOps for CoinoneAdapter {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Coinone
    }

    async fn base_url(&self) -> Result<Url, DataError> {
        Url::parse(WS_BASE_URL_COINONE)
            .map_err(|error| DataError::Socket(SocketError::Url(error)))
    }

    async fn send_subscribe(
        &self,
        io: &AdapterIo,
        _set: &SubscriptionSet,
        delta: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        self.send_requests(io, "SUBSCRIBE", delta).await
    }

    async fn send_unsubscribe(
        &self,
        io: &AdapterIo,
        _set: &SubscriptionSet,
        removed: &[(InstrumentId, Topic)],
    ) -> Result<(), DataError> {
        self.send_requests(io, "UNSUBSCRIBE", removed).await
    }

    fn process_message(&self, payload: &Bytes) -> Result<(), DataError> {
        let frame = serde_json::from_slice::<ResponseFrame<'_>>(payload)
            .map_err(|error| DataError::parse(error, payload))?;

        if frame.response_type != "DATA" {
            // PONG is consumed by the watchdog; ERROR and acks are logged
            debug!(response_type = frame.response_type, "non-data frame");
            return Ok(());
        }

        let Some(data) = frame.data else {
            return Ok(());
        };

        match frame.channel {
            Some("ORDERBOOK") => self.on_orderbook(data),
            Some("TRADE") => self.on_trade(data),
            other => {
                debug!(channel = ?other, "unhandled channel");
                Ok(())
            }
        }
    }

    fn ping_message(&self) -> Option<WsMessage> {
        Some(WsMessage::text(r#"{"request_type":"PING"}"#))
    }

    fn is_pong_message(&self, payload: &[u8]) -> bool {
        is_pong(payload)
    }

    fn forced_ping_interval(&self) -> Option<Duration> {
        Some(COINONE_PING_INTERVAL)
    }
}
