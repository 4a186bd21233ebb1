//! Available-position seam for spot-sell safety.

use arara_markets::{InstrumentId, Quantity};

/// Read-side of the host's position keeping.
pub trait PositionSource: Send + Sync {
    /// Base quantity currently available to sell for the instrument.
    fn available_position(&self, instrument_id: InstrumentId) -> Quantity;
}
