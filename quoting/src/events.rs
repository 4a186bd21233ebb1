//! Shared event hubs of the quoting stack.

use crate::config::QuotingParameters;
use crate::quote::QuotePair;
use crate::validator::QuoteStatus;
use arara_data::order::ClientOrderId;
use arara_integration::event::EventHub;
use arara_markets::{InstrumentId, Side};
use std::sync::Arc;

/// A resting order of ours filled completely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFullyFilled {
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub client_order_id: ClientOrderId,
}

/// Per-side live/held transition published by the market maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteStatusChanged {
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub status: QuoteStatus,
}

/// Event hubs shared by the engine, market maker and quoters of one
/// instrument.
#[derive(Debug)]
pub struct QuotingEvents {
    /// Every computed target, including those withheld during a pause.
    pub quote_pairs: EventHub<QuotePair>,
    /// Fired whenever skew (or the host) rewrites the parameter set.
    pub parameters_updated: EventHub<QuotingParameters>,
    pub order_fully_filled: EventHub<OrderFullyFilled>,
    pub status_changed: EventHub<QuoteStatusChanged>,
}

impl QuotingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            quote_pairs: EventHub::new(),
            parameters_updated: EventHub::new(),
            order_fully_filled: EventHub::new(),
            status_changed: EventHub::new(),
        })
    }
}
