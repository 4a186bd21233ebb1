//! Client order id minting and order construction defaults.

use crate::order::{NewOrder, OrderKind};
use arara_data::order::ClientOrderId;
use arara_markets::{Instrument, Price, Quantity, Side};
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Mints unique client order ids and applies engine-wide order defaults.
///
/// Ids are `(unix_seconds << 20) | counter`: sortable by creation time,
/// unique across restarts, and safely inside `u64`. The counter starts at
/// a random offset so two builders born in the same second do not collide.
pub struct OrderBuilder {
    post_only: bool,
    next: AtomicU64,
}

impl fmt::Debug for OrderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBuilder")
            .field("post_only", &self.post_only)
            .finish()
    }
}

impl OrderBuilder {
    pub fn new(post_only: bool) -> Self {
        let seconds = Utc::now().timestamp().max(0) as u64;
        let offset = u64::from(rand::random::<u16>());
        Self {
            post_only,
            next: AtomicU64::new((seconds << 20) | offset),
        }
    }

    pub fn is_post_only(&self) -> bool {
        self.post_only
    }

    pub fn next_client_order_id(&self) -> ClientOrderId {
        ClientOrderId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn build(
        &self,
        instrument: &Instrument,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> NewOrder {
        NewOrder {
            client_order_id: self.next_client_order_id(),
            instrument_id: instrument.id,
            side,
            price,
            quantity,
            kind: if self.post_only {
                OrderKind::LimitPostOnly
            } else {
                OrderKind::Limit
            },
        }
    }
}
