//! Normalised order status reports and fills from venue private streams.

use arara_markets::{InstrumentId, Price, Quantity, Side};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Client-assigned numeric order identity, unique per deployment.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Default,
    Deserialize,
    Serialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct ClientOrderId(pub u64);

/// Lifecycle state of an order as reported by the venue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum OrderStatus {
    Pending,
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal states free the client order id for reuse bookkeeping.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// Normalised private-stream order report.
///
/// Invariant: `leaves_quantity + cumulative_filled() == quantity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusReport {
    pub client_order_id: ClientOrderId,
    pub exchange_order_id: Option<SmolStr>,
    pub execution_id: Option<SmolStr>,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub status: OrderStatus,
    pub price: Price,
    pub quantity: Quantity,
    pub last_price: Price,
    pub last_quantity: Quantity,
    pub leaves_quantity: Quantity,
    /// Venue report time, unix epoch milliseconds.
    pub timestamp: u64,
}

impl OrderStatusReport {
    pub fn cumulative_filled(&self) -> Quantity {
        self.quantity.saturating_sub(self.leaves_quantity)
    }

    /// A report describes an execution when the venue attached a traded
    /// quantity to it.
    pub fn is_fill(&self) -> bool {
        self.last_quantity.raw() > 0
    }
}

/// Realised execution derived from an [`OrderStatusReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub client_order_id: ClientOrderId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: u64,
}

impl Fill {
    /// Derive a fill from a report, if it carries one.
    pub fn from_report(report: &OrderStatusReport) -> Option<Fill> {
        report.is_fill().then(|| Fill {
            client_order_id: report.client_order_id,
            instrument_id: report.instrument_id,
            side: report.side,
            price: report.last_price,
            quantity: report.last_quantity,
            timestamp: report.timestamp,
        })
    }
}

/// Private-channel authentication outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStateChanged {
    pub exchange: arara_markets::ExchangeId,
    pub authenticated: bool,
}
