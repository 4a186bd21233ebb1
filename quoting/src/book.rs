//! Shared best bid/ask view consumed by hitting logic.

use arara_data::event::{MarketDataEvent, MarketDataEventKind};
use arara_data::feed::EventDispatcher;
use arara_data::subscription::Topic;
use arara_integration::event::HubSubscription;
use arara_markets::{InstrumentId, Price, Side};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Best bid/ask of one instrument. A vanished side is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BestBook {
    pub bid: Option<Price>,
    pub ask: Option<Price>,
}

impl BestBook {
    /// One-tick-spread test used by the pennying fallback.
    pub fn spread_is_one_tick(&self, tick: Price) -> bool {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => ask.saturating_sub(bid) == tick,
            _ => false,
        }
    }
}

/// Maintains per-instrument [`BestBook`]s from best-quote events.
#[derive(Debug, Default)]
pub struct BestBookTracker {
    books: RwLock<FnvHashMap<InstrumentId, BestBook>>,
}

impl BestBookTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to a feed dispatcher's market data hub.
    pub fn attach(self: &Arc<Self>, dispatcher: &EventDispatcher) -> HubSubscription {
        let tracker = Arc::clone(self);
        dispatcher
            .market_data
            .subscribe(move |event: &MarketDataEvent| tracker.on_event(event))
    }

    /// Apply one best-quote event. Zero-size entries delete the level.
    pub fn on_event(&self, event: &MarketDataEvent) {
        if event.topic_id != Topic::BestQuotes.id()
            || !matches!(
                event.kind,
                MarketDataEventKind::Update | MarketDataEventKind::Snapshot
            )
        {
            return;
        }

        let mut books = self.books.write();
        let book = books.entry(event.instrument_id).or_default();
        for entry in event.updates.as_slice() {
            let level = (!entry.quantity.is_zero()).then_some(entry.price);
            match entry.side {
                Side::Buy => book.bid = level,
                Side::Sell => book.ask = level,
            }
        }
    }

    pub fn best(&self, instrument_id: InstrumentId) -> BestBook {
        self.books
            .read()
            .get(&instrument_id)
            .copied()
            .unwrap_or_default()
    }

    /// Directly seed a book; used by hosts that track quotes elsewhere.
    pub fn set(&self, instrument_id: InstrumentId, book: BestBook) {
        self.books.write().insert(instrument_id, book);
    }
}
