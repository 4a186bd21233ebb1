//! Quote targets emitted by the engine and consumed by the market maker.

use arara_markets::{InstrumentId, Price, Quantity};

/// One side of a quote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: Price,
    pub size: Quantity,
}

impl Quote {
    pub fn new(price: Price, size: Quantity) -> Self {
        Self { price, size }
    }
}

/// Two-sided quote target. Either side may be absent (eg/ an inventory cap
/// dropped it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotePair {
    pub instrument_id: InstrumentId,
    pub bid: Option<Quote>,
    pub ask: Option<Quote>,
    /// Engine-side creation time, unix epoch milliseconds.
    pub creation_timestamp: u64,
    pub is_post_only: bool,
}

impl QuotePair {
    /// Bid/ask price spread, when both sides are present.
    pub fn spread(&self) -> Option<Price> {
        match (&self.bid, &self.ask) {
            (Some(bid), Some(ask)) => Some(ask.price.saturating_sub(bid.price)),
            _ => None,
        }
    }
}
