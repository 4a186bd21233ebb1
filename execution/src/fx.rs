//! Optional FX conversion seam.

use arara_markets::Currency;
use rust_decimal::Decimal;

/// Optional external FX rate source; `None` when a pair is not quotable.
pub trait FxRateService: Send + Sync {
    fn convert(&self, amount: Decimal, from: &Currency, to: &Currency) -> Option<Decimal>;
}
