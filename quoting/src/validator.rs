//! Target-side validation ahead of quoter dispatch.

use crate::quote::{Quote, QuotePair};
use arara_execution::fx::FxRateService;
use arara_markets::{Currency, Instrument, Quantity};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Validation outcome for one side of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStatus {
    /// Dispatch to the quoter as a live quote.
    Live,
    /// Withhold the side; the quoter cancels any resting order.
    Held,
}

/// Validates each side of a [`QuotePair`] before quoter dispatch.
///
/// A side is `Held` when quoting is paused, the side is absent, the size
/// is below the instrument minimum, or the optional notional floor (FX
/// converted into the instrument's quote currency) is not met.
pub struct QuoteValidator {
    instrument: Instrument,
    notional_floor: Option<(Decimal, Currency)>,
    fx: Option<Arc<dyn FxRateService>>,
}

impl fmt::Debug for QuoteValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteValidator")
            .field("instrument", &self.instrument.id)
            .field("notional_floor", &self.notional_floor)
            .finish()
    }
}

impl QuoteValidator {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            notional_floor: None,
            fx: None,
        }
    }

    pub fn with_notional_floor(
        mut self,
        floor: Decimal,
        currency: Currency,
        fx: Arc<dyn FxRateService>,
    ) -> Self {
        self.notional_floor = Some((floor, currency));
        self.fx = Some(fx);
        self
    }

    /// Validate both sides; `paused` holds everything.
    pub fn validate(&self, pair: &QuotePair, paused: bool) -> (QuoteStatus, QuoteStatus) {
        if paused {
            return (QuoteStatus::Held, QuoteStatus::Held);
        }
        (
            self.validate_side(pair.bid.as_ref()),
            self.validate_side(pair.ask.as_ref()),
        )
    }

    fn validate_side(&self, quote: Option<&Quote>) -> QuoteStatus {
        let Some(quote) = quote else {
            return QuoteStatus::Held;
        };
        if quote.size < self.instrument.min_order_size || quote.size == Quantity::ZERO {
            return QuoteStatus::Held;
        }
        if !self.meets_notional_floor(quote) {
            return QuoteStatus::Held;
        }
        QuoteStatus::Live
    }

    fn meets_notional_floor(&self, quote: &Quote) -> bool {
        let (Some((floor, currency)), Some(fx)) = (&self.notional_floor, &self.fx) else {
            return true;
        };

        let notional = quote.price.to_decimal() * quote.size.to_decimal();
        match fx.convert(*floor, currency, &self.instrument.quote) {
            Some(floor_in_quote) => notional >= floor_in_quote,
            // Unquotable pair: fail open rather than suppress quoting
            None => true,
        }
    }
}
