//! BitMEX `orderBookL2_25` assembly.
//!
//! The venue keys levels by a numeric id: the initial `partial` establishes
//! the per-instrument id-to-price map, later `update`/`delete` actions carry
//! only `(id, size)` and resolve their price through the map. Every
//! `partial` clears the map before repopulating it.

use crate::event::{chunk_events, EventHeader, MarketDataEvent, MarketDataEventKind, PriceLevelEntry};
use crate::subscription::Topic;
use arara_markets::{ExchangeId, InstrumentId, Price, Quantity, Side};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// L2 action verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2Action {
    Partial,
    Update,
    Insert,
    Delete,
}

impl L2Action {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "partial" => Some(L2Action::Partial),
            "update" => Some(L2Action::Update),
            "insert" => Some(L2Action::Insert),
            "delete" => Some(L2Action::Delete),
            _ => None,
        }
    }
}

/// One already-resolved venue level mutation.
#[derive(Debug, Clone, Copy)]
pub struct L2Level {
    pub id: u64,
    pub side: Side,
    pub price: Option<Price>,
    pub size: Option<Quantity>,
}

/// Per-instrument id-keyed book assembler; owned by exactly one adapter.
#[derive(Debug)]
pub struct L2Book {
    instrument_id: InstrumentId,
    id_to_price: Mutex<FnvHashMap<u64, Price>>,
    sequence: AtomicU64,
}

impl L2Book {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            id_to_price: Mutex::new(FnvHashMap::default()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.instrument_id
    }

    /// Forget all price mappings; the next `partial` rebuilds them.
    pub fn clear(&self) {
        self.id_to_price.lock().clear();
    }

    /// Apply one venue action and produce the chunked events to dispatch.
    ///
    /// The first chunk of a `partial` carries `Snapshot`; its remaining
    /// chunks carry `Update` and share the same sequence and timestamp.
    pub fn apply(
        &self,
        action: L2Action,
        levels: &[L2Level],
        timestamp: u64,
    ) -> Vec<MarketDataEvent> {
        let mut map = self.id_to_price.lock();
        let mut entries = Vec::with_capacity(levels.len());

        match action {
            L2Action::Partial => {
                map.clear();
                for level in levels {
                    let Some(price) = level.price else {
                        debug!(id = level.id, "partial level without price, skipped");
                        continue;
                    };
                    map.insert(level.id, price);
                    entries.push(PriceLevelEntry::new(
                        level.side,
                        price,
                        level.size.unwrap_or(Quantity::ZERO),
                    ));
                }
            }
            L2Action::Insert => {
                for level in levels {
                    let Some(price) = level.price else {
                        debug!(id = level.id, "insert level without price, skipped");
                        continue;
                    };
                    map.insert(level.id, price);
                    entries.push(PriceLevelEntry::new(
                        level.side,
                        price,
                        level.size.unwrap_or(Quantity::ZERO),
                    ));
                }
            }
            L2Action::Update => {
                for level in levels {
                    let Some(price) = map.get(&level.id).copied() else {
                        debug!(id = level.id, "update for unknown level id, skipped");
                        continue;
                    };
                    entries.push(PriceLevelEntry::new(
                        level.side,
                        price,
                        level.size.unwrap_or(Quantity::ZERO),
                    ));
                }
            }
            L2Action::Delete => {
                for level in levels {
                    let Some(price) = map.remove(&level.id) else {
                        debug!(id = level.id, "delete for unknown level id, skipped");
                        continue;
                    };
                    entries.push(PriceLevelEntry::new(level.side, price, Quantity::ZERO));
                }
            }
        }
        drop(map);

        if entries.is_empty() && action != L2Action::Partial {
            return Vec::new();
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let header = EventHeader {
            sequence,
            prev_sequence: sequence.saturating_sub(1),
            timestamp,
            instrument_id: self.instrument_id,
            exchange: ExchangeId::Bitmex,
            topic_id: Topic::DepthUpdates.id(),
        };

        let (first_kind, rest_kind) = match action {
            L2Action::Partial => (MarketDataEventKind::Snapshot, MarketDataEventKind::Update),
            L2Action::Insert => (MarketDataEventKind::Add, MarketDataEventKind::Add),
            L2Action::Update => (MarketDataEventKind::Update, MarketDataEventKind::Update),
            L2Action::Delete => (MarketDataEventKind::Delete, MarketDataEventKind::Delete),
        };

        chunk_events(header, first_kind, rest_kind, &entries).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: u64, side: Side, price: Option<i64>, size: Option<i64>) -> L2Level {
        L2Level {
            id,
            side,
            price: price.map(Price::from_raw),
            size: size.map(Quantity::from_raw),
        }
    }

    #[test]
    fn test_partial_batch_of_fifty_chunks_as_snapshot_then_update() {
        let book = L2Book::new(InstrumentId(5));

        let levels = (0..50)
            .map(|index| {
                level(
                    1000 + index,
                    Side::Sell,
                    Some(100_000 + index as i64),
                    Some(10),
                )
            })
            .collect::<Vec<_>>();

        let events = book.apply(L2Action::Partial, &levels, 42);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, MarketDataEventKind::Snapshot);
        assert_eq!(events[0].update_count(), 40);
        assert!(!events[0].is_last_chunk);
        assert_eq!(events[1].kind, MarketDataEventKind::Update);
        assert_eq!(events[1].update_count(), 10);
        assert!(events[1].is_last_chunk);
        assert_eq!(events[0].timestamp, events[1].timestamp);
        assert_eq!(events[0].sequence, events[1].sequence);
    }

    #[test]
    fn test_update_resolves_price_from_partial_map() {
        let book = L2Book::new(InstrumentId(5));
        book.apply(
            L2Action::Partial,
            &[level(7, Side::Buy, Some(99_000), Some(5))],
            1,
        );

        // Update carries only (id, size)
        let events = book.apply(
            L2Action::Update,
            &[level(7, Side::Buy, None, Some(8))],
            2,
        );
        assert_eq!(events.len(), 1);
        let entry = events[0].updates.as_slice()[0];
        assert_eq!(entry.price, Price::from_raw(99_000));
        assert_eq!(entry.quantity, Quantity::from_raw(8));
    }

    #[test]
    fn test_delete_removes_mapping_and_emits_zero_quantity() {
        let book = L2Book::new(InstrumentId(5));
        book.apply(
            L2Action::Partial,
            &[level(7, Side::Buy, Some(99_000), Some(5))],
            1,
        );

        let events = book.apply(L2Action::Delete, &[level(7, Side::Buy, None, None)], 2);
        assert_eq!(events[0].kind, MarketDataEventKind::Delete);
        assert!(events[0].updates.as_slice()[0].is_removal());

        // The mapping is gone: a second delete resolves nothing
        let events = book.apply(L2Action::Delete, &[level(7, Side::Buy, None, None)], 3);
        assert!(events.is_empty());
    }

    #[test]
    fn test_partial_clears_previous_map() {
        let book = L2Book::new(InstrumentId(5));
        book.apply(
            L2Action::Partial,
            &[level(7, Side::Buy, Some(99_000), Some(5))],
            1,
        );
        // New partial without id 7
        book.apply(
            L2Action::Partial,
            &[level(8, Side::Buy, Some(98_000), Some(5))],
            2,
        );

        let events = book.apply(
            L2Action::Update,
            &[level(7, Side::Buy, None, Some(1))],
            3,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_sequences_are_monotonic_per_book() {
        let book = L2Book::new(InstrumentId(5));
        let first = book.apply(
            L2Action::Partial,
            &[level(1, Side::Buy, Some(1), Some(1))],
            1,
        );
        let second = book.apply(
            L2Action::Insert,
            &[level(2, Side::Buy, Some(2), Some(1))],
            2,
        );
        assert!(second[0].sequence > first[0].sequence);
        assert_eq!(second[0].prev_sequence, first[0].sequence);
    }
}
