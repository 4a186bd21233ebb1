//! Normalised market data event model.
//!
//! Events carry their price levels in a fixed-capacity inline array. Venue
//! messages with more levels than one array holds are emitted as a run of
//! chunked events sharing the same `sequence`/`prev_sequence`, with only the
//! final chunk flagged [`MarketDataEvent::is_last_chunk`].

use arara_markets::{ExchangeId, InstrumentId, Price, Quantity, Side};

/// Capacity of the inline level array carried by each event.
pub const MAX_LEVELS_PER_EVENT: usize = 40;

/// One price level mutation. A zero quantity denotes level removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevelEntry {
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
}

impl PriceLevelEntry {
    pub fn new(side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            side,
            price,
            quantity,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl Default for PriceLevelEntry {
    fn default() -> Self {
        Self {
            side: Side::Buy,
            price: Price::ZERO,
            quantity: Quantity::ZERO,
        }
    }
}

/// Fixed-capacity inline array of [`PriceLevelEntry`]s.
#[derive(Debug, Clone, Copy)]
pub struct PriceLevelEntryArray {
    entries: [PriceLevelEntry; MAX_LEVELS_PER_EVENT],
    len: u8,
}

impl Default for PriceLevelEntryArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceLevelEntryArray {
    pub const CAPACITY: usize = MAX_LEVELS_PER_EVENT;

    pub fn new() -> Self {
        Self {
            entries: [PriceLevelEntry::default(); MAX_LEVELS_PER_EVENT],
            len: 0,
        }
    }

    /// Copy at most [`Self::CAPACITY`] entries from the slice; callers chunk
    /// longer inputs first.
    pub fn from_slice(entries: &[PriceLevelEntry]) -> Self {
        debug_assert!(entries.len() <= Self::CAPACITY);
        let mut array = Self::new();
        let take = entries.len().min(Self::CAPACITY);
        array.entries[..take].copy_from_slice(&entries[..take]);
        array.len = take as u8;
        array
    }

    /// Append an entry; returns false once full.
    pub fn push(&mut self, entry: PriceLevelEntry) -> bool {
        if (self.len as usize) == Self::CAPACITY {
            return false;
        }
        self.entries[self.len as usize] = entry;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[PriceLevelEntry] {
        &self.entries[..self.len as usize]
    }
}

impl PartialEq for PriceLevelEntryArray {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for PriceLevelEntryArray {}

impl<'a> IntoIterator for &'a PriceLevelEntryArray {
    type Item = &'a PriceLevelEntry;
    type IntoIter = std::slice::Iter<'a, PriceLevelEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

/// Kind of a normalised market data event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketDataEventKind {
    Snapshot,
    Update,
    Trade,
    Add,
    Delete,
}

/// Normalised market data event.
///
/// For a given `(instrument_id, topic_id)` the dispatched `sequence` values
/// are monotonically non-decreasing; equal sequences only occur between
/// chunked siblings of the same original venue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketDataEvent {
    pub sequence: u64,
    /// Venue event time, unix epoch milliseconds.
    pub timestamp: u64,
    pub kind: MarketDataEventKind,
    pub instrument_id: InstrumentId,
    pub exchange: ExchangeId,
    pub prev_sequence: u64,
    pub topic_id: u16,
    pub updates: PriceLevelEntryArray,
    pub is_last_chunk: bool,
}

impl MarketDataEvent {
    pub fn update_count(&self) -> u8 {
        self.updates.len() as u8
    }
}

/// Fields shared by every chunk emitted for one venue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub sequence: u64,
    pub prev_sequence: u64,
    pub timestamp: u64,
    pub instrument_id: InstrumentId,
    pub exchange: ExchangeId,
    pub topic_id: u16,
}

impl EventHeader {
    /// Build a single complete event from at most one chunk of entries.
    pub fn single(
        self,
        kind: MarketDataEventKind,
        entries: &[PriceLevelEntry],
    ) -> MarketDataEvent {
        debug_assert!(entries.len() <= PriceLevelEntryArray::CAPACITY);
        MarketDataEvent {
            sequence: self.sequence,
            timestamp: self.timestamp,
            kind,
            instrument_id: self.instrument_id,
            exchange: self.exchange,
            prev_sequence: self.prev_sequence,
            topic_id: self.topic_id,
            updates: PriceLevelEntryArray::from_slice(entries),
            is_last_chunk: true,
        }
    }
}

/// Split `entries` into 40-wide chunks sharing the header's sequence fields.
///
/// The first chunk carries `first_kind` (eg/ `Snapshot`), every subsequent
/// chunk carries `rest_kind` (eg/ `Update`); only the final chunk sets
/// `is_last_chunk`. Empty input yields one empty final chunk.
pub fn chunk_events<'a>(
    header: EventHeader,
    first_kind: MarketDataEventKind,
    rest_kind: MarketDataEventKind,
    entries: &'a [PriceLevelEntry],
) -> impl Iterator<Item = MarketDataEvent> + 'a {
    let chunk_count = entries.len().div_ceil(PriceLevelEntryArray::CAPACITY).max(1);

    (0..chunk_count).map(move |chunk_index| {
        let start = chunk_index * PriceLevelEntryArray::CAPACITY;
        let end = (start + PriceLevelEntryArray::CAPACITY).min(entries.len());
        MarketDataEvent {
            sequence: header.sequence,
            timestamp: header.timestamp,
            kind: if chunk_index == 0 { first_kind } else { rest_kind },
            instrument_id: header.instrument_id,
            exchange: header.exchange,
            prev_sequence: header.prev_sequence,
            topic_id: header.topic_id,
            updates: PriceLevelEntryArray::from_slice(&entries[start..end]),
            is_last_chunk: chunk_index == chunk_count - 1,
        }
    })
}

/// Fair value signal consumed by the quoting engine.
///
/// Invariant: `fair_bid <= fair_ask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FairValueUpdate {
    pub instrument_id: InstrumentId,
    pub fair_ask: Price,
    pub fair_bid: Price,
}
