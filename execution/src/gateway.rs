//! The order gateway seam.

use crate::error::ExecutionError;
use crate::order::{NewOrder, OrderKind};
use arara_data::order::{ClientOrderId, OrderStatusReport};
use arara_markets::Price;
use async_trait::async_trait;

/// Downstream order gateway; implemented by the host against its venue
/// connectivity. Every call resolves to a terminal-or-intermediate
/// [`OrderStatusReport`].
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Whether the venue supports in-place price replacement. Venues
    /// without it are driven with cancel-and-re-create.
    fn supports_replace(&self) -> bool {
        true
    }

    async fn submit(&self, order: NewOrder) -> Result<OrderStatusReport, ExecutionError>;

    async fn replace(
        &self,
        client_order_id: ClientOrderId,
        new_price: Price,
        kind: OrderKind,
    ) -> Result<OrderStatusReport, ExecutionError>;

    async fn cancel(
        &self,
        client_order_id: ClientOrderId,
    ) -> Result<OrderStatusReport, ExecutionError>;

    /// Cancel a batch in one venue call; each order resolves to its own
    /// response.
    async fn bulk_cancel(
        &self,
        client_order_ids: Vec<ClientOrderId>,
    ) -> Vec<(ClientOrderId, Result<OrderStatusReport, ExecutionError>)>;
}
