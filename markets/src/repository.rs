//! Instrument lookup seam and the in-memory boot-time index.

use crate::exchange::ExchangeId;
use crate::instrument::{Instrument, InstrumentId, ProductType};
use fnv::FnvHashMap;
use smol_str::SmolStr;
use thiserror::Error;

/// Read-only instrument master data.
///
/// Implementations are frozen after boot; every adapter and quoter holds a
/// shared reference and performs lock-free lookups on the hot path.
pub trait InstrumentRepository: Send + Sync {
    fn find_by_symbol(
        &self,
        symbol: &str,
        product: ProductType,
        exchange: ExchangeId,
    ) -> Option<&Instrument>;

    fn get_by_id(&self, id: InstrumentId) -> Option<&Instrument>;
}

/// Errors produced while building an [`InstrumentIndex`].
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum IndexError {
    #[error("duplicate instrument id: {0}")]
    DuplicateId(InstrumentId),

    #[error("duplicate instrument key: ({0}, {1}, {2})")]
    DuplicateKey(SmolStr, ProductType, ExchangeId),

    #[error("invalid instrument {0}: {1}")]
    InvalidInstrument(InstrumentId, String),
}

/// In-memory [`InstrumentRepository`] built once at boot.
#[derive(Debug, Default)]
pub struct InstrumentIndex {
    by_id: FnvHashMap<InstrumentId, Instrument>,
    by_key: FnvHashMap<(SmolStr, ProductType, ExchangeId), InstrumentId>,
}

impl InstrumentIndex {
    pub fn builder() -> InstrumentIndexBuilder {
        InstrumentIndexBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.by_id.values()
    }
}

impl InstrumentRepository for InstrumentIndex {
    fn find_by_symbol(
        &self,
        symbol: &str,
        product: ProductType,
        exchange: ExchangeId,
    ) -> Option<&Instrument> {
        let key = (SmolStr::new(symbol), product, exchange);
        self.by_key.get(&key).and_then(|id| self.by_id.get(id))
    }

    fn get_by_id(&self, id: InstrumentId) -> Option<&Instrument> {
        self.by_id.get(&id)
    }
}

/// Builder that validates instrument definitions before freezing the index.
#[derive(Debug, Default)]
pub struct InstrumentIndexBuilder {
    instruments: Vec<Instrument>,
}

impl InstrumentIndexBuilder {
    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.push(instrument);
        self
    }

    pub fn with_instruments<I>(mut self, instruments: I) -> Self
    where
        I: IntoIterator<Item = Instrument>,
    {
        self.instruments.extend(instruments);
        self
    }

    pub fn build(self) -> Result<InstrumentIndex, IndexError> {
        let mut index = InstrumentIndex::default();

        for instrument in self.instruments {
            if instrument.tick_size.raw() <= 0 {
                return Err(IndexError::InvalidInstrument(
                    instrument.id,
                    format!("non-positive tick size: {}", instrument.tick_size),
                ));
            }

            let key = (
                instrument.symbol.clone(),
                instrument.product,
                instrument.exchange,
            );
            if index.by_key.contains_key(&key) {
                return Err(IndexError::DuplicateKey(key.0, key.1, key.2));
            }
            if index.by_id.contains_key(&instrument.id) {
                return Err(IndexError::DuplicateId(instrument.id));
            }

            index.by_key.insert(key, instrument.id);
            index.by_id.insert(instrument.id, instrument);
        }

        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::{Price, Quantity};
    use crate::Currency;

    fn instrument(id: u32, symbol: &str, exchange: ExchangeId) -> Instrument {
        Instrument {
            id: InstrumentId(id),
            symbol: SmolStr::new(symbol),
            product: ProductType::Spot,
            exchange,
            base: Currency::new("BTC"),
            quote: Currency::new("USDT"),
            tick_size: Price::from_raw(100),
            min_order_size: Quantity::from_raw(1_000),
        }
    }

    #[test]
    fn test_index_lookup_by_id_and_key() {
        let index = InstrumentIndex::builder()
            .with_instrument(instrument(1, "BTCUSDT", ExchangeId::Binance))
            .with_instrument(instrument(2, "BTCUSDT", ExchangeId::Bithumb))
            .build()
            .unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get_by_id(InstrumentId(2)).unwrap().exchange, ExchangeId::Bithumb);

        let found = index
            .find_by_symbol("BTCUSDT", ProductType::Spot, ExchangeId::Binance)
            .unwrap();
        assert_eq!(found.id, InstrumentId(1));

        assert!(index
            .find_by_symbol("ETHUSDT", ProductType::Spot, ExchangeId::Binance)
            .is_none());
    }

    #[test]
    fn test_index_rejects_duplicates() {
        let result = InstrumentIndex::builder()
            .with_instrument(instrument(1, "BTCUSDT", ExchangeId::Binance))
            .with_instrument(instrument(1, "ETHUSDT", ExchangeId::Binance))
            .build();
        assert_eq!(result.unwrap_err(), IndexError::DuplicateId(InstrumentId(1)));

        let result = InstrumentIndex::builder()
            .with_instrument(instrument(1, "BTCUSDT", ExchangeId::Binance))
            .with_instrument(instrument(2, "BTCUSDT", ExchangeId::Binance))
            .build();
        assert!(matches!(result, Err(IndexError::DuplicateKey(..))));
    }

    #[test]
    fn test_index_rejects_zero_tick() {
        let mut bad = instrument(1, "BTCUSDT", ExchangeId::Binance);
        bad.tick_size = Price::ZERO;

        let result = InstrumentIndex::builder().with_instrument(bad).build();
        assert!(matches!(result, Err(IndexError::InvalidInstrument(..))));
    }
}
