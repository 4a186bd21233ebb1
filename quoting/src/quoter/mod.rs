//! Per-side quoters: reconcile a desired quote against live venue orders.

use crate::error::QuotingError;
use crate::quote::Quote;
use arara_data::order::{ClientOrderId, OrderStatusReport};
use arara_markets::{Price, Quantity, Side};
use async_trait::async_trait;

/// Hitting-logic price safeguards.
pub mod hitting;

/// One live order per side.
pub mod single;

/// Layered group of orders per side.
pub mod layered;

pub use single::SingleOrderQuoter;
pub use layered::LayeredQuoter;

/// Lifecycle of an order the quoter is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOrderState {
    /// Submitted, no ack yet.
    PendingNew,
    /// Resting on the venue.
    Working,
    /// Cancel issued, terminal report pending.
    CancelRequested,
}

/// Quoter-side view of one of our orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveOrder {
    pub client_order_id: ClientOrderId,
    pub price: Price,
    pub quantity: Quantity,
    pub filled: Quantity,
    pub state: LiveOrderState,
}

impl LiveOrder {
    pub fn new(client_order_id: ClientOrderId, price: Price, quantity: Quantity) -> Self {
        Self {
            client_order_id,
            price,
            quantity,
            filled: Quantity::ZERO,
            state: LiveOrderState::PendingNew,
        }
    }

    pub fn is_partially_filled(&self) -> bool {
        self.filled.raw() > 0 && self.filled < self.quantity
    }

    pub fn is_cancellable(&self) -> bool {
        !matches!(self.state, LiveOrderState::CancelRequested)
    }
}

/// One side of a market maker: owns the live orders of that side and
/// reconciles them against the latest target.
///
/// Exactly one of `{submit, replace, cancel, no-op}` gateway actions
/// results from each `update_quote` call.
#[async_trait]
pub trait SideQuoter: Send + Sync {
    fn side(&self) -> Side;

    /// Reconcile towards the new target quote.
    async fn update_quote(&self, quote: Quote) -> Result<(), QuotingError>;

    /// Withdraw this side from the market.
    async fn cancel_quote(&self) -> Result<(), QuotingError>;

    /// Best-effort bulk cancellation on shutdown.
    async fn cancel_all(&self) -> Result<(), QuotingError>;

    /// Route a venue status report for an order this quoter may own.
    async fn on_order_status(&self, report: OrderStatusReport);
}
