//! Outbound order model.

use arara_data::order::ClientOrderId;
use arara_markets::{InstrumentId, Price, Quantity, Side};
use serde::{Deserialize, Serialize};

/// Limit order flavour. Post-only orders must never execute as taker.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum OrderKind {
    Limit,
    LimitPostOnly,
}

impl OrderKind {
    pub fn is_post_only(self) -> bool {
        matches!(self, OrderKind::LimitPostOnly)
    }
}

/// A new order handed to the [`OrderGateway`](crate::gateway::OrderGateway).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrder {
    pub client_order_id: ClientOrderId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub kind: OrderKind,
}
