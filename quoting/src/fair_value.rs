//! Fair value provider seam.

use arara_data::event::FairValueUpdate;
use arara_integration::event::EventHub;

/// Market data capability the provider consumes to form its signal.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FairValueSource {
    FullBook,
    BestBook,
}

/// External fair value signal source.
///
/// The engine subscribes to [`Self::fair_values`] on `start` and
/// unsubscribes on `stop`.
pub trait FairValueProvider: Send + Sync {
    fn source(&self) -> FairValueSource;

    fn fair_values(&self) -> &EventHub<FairValueUpdate>;
}
