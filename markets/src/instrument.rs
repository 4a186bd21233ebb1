//! Core instrument abstractions

use crate::exchange::ExchangeId;
use crate::price::{Price, Quantity};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// Numeric instrument identity, unique across the whole deployment.
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
pub struct InstrumentId(pub u32);

/// Product category of an instrument.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum ProductType {
    Spot,
    PerpetualFuture,
}

impl Display for ProductType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::Spot => write!(f, "spot"),
            ProductType::PerpetualFuture => write!(f, "perpetual"),
        }
    }
}

/// Currency code, normalized to upper case (eg/ "BTC", "USDT", "KRW").
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct Currency(SmolStr);

impl Currency {
    pub fn new(code: &str) -> Self {
        Self(SmolStr::new(code.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Static description of a tradable instrument on a specific venue.
///
/// Identity is the numeric [`InstrumentId`]; `(symbol, product, exchange)`
/// lookups are served by the [`InstrumentIndex`](crate::InstrumentIndex).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: SmolStr,
    pub product: ProductType,
    pub exchange: ExchangeId,
    pub base: Currency,
    pub quote: Currency,
    pub tick_size: Price,
    pub min_order_size: Quantity,
}

impl Instrument {
    pub fn is_derivative(&self) -> bool {
        matches!(self.product, ProductType::PerpetualFuture)
    }
}

impl Display for Instrument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}|{}|{})",
            self.exchange, self.product, self.symbol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn instrument(id: u32, symbol: &str, product: ProductType) -> Instrument {
        Instrument {
            id: InstrumentId(id),
            symbol: SmolStr::new(symbol),
            product,
            exchange: ExchangeId::Binance,
            base: Currency::new("btc"),
            quote: Currency::new("usdt"),
            tick_size: Price::from_raw(1_000_000),
            min_order_size: Quantity::from_raw(100_000),
        }
    }

    #[test]
    fn test_currency_normalizes_case() {
        assert_eq!(Currency::new("krw").as_str(), "KRW");
        assert_eq!(Currency::new("USDT"), Currency::new("usdt"));
    }

    #[test]
    fn test_instrument_display_and_kind() {
        let spot = instrument(1, "BTCUSDT", ProductType::Spot);
        assert!(!spot.is_derivative());
        assert_eq!(spot.to_string(), "(BINANCE|spot|BTCUSDT)");

        let perp = instrument(2, "BTCUSDT", ProductType::PerpetualFuture);
        assert!(perp.is_derivative());
    }
}
