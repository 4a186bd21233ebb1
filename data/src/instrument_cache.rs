//! Symbol-span to [`InstrumentId`] resolution cache.
//!
//! Venue parsers see symbols as UTF-8 spans inside the raw message region.
//! Resolving them through the repository on every message would allocate an
//! owned string; this cache pays that cost once per symbol and serves every
//! later hit from an FNV map keyed by the span itself.

use arara_markets::{ExchangeId, InstrumentId, InstrumentRepository, ProductType};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use smol_str::{format_smolstr, SmolStr};
use std::fmt;
use std::sync::Arc;

/// Per-adapter symbol resolution cache.
pub struct SymbolCache {
    exchange: ExchangeId,
    product: ProductType,
    repository: Arc<dyn InstrumentRepository>,
    cache: RwLock<FnvHashMap<SmolStr, Option<InstrumentId>>>,
}

impl fmt::Debug for SymbolCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolCache")
            .field("exchange", &self.exchange)
            .field("product", &self.product)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl SymbolCache {
    pub fn new(
        exchange: ExchangeId,
        product: ProductType,
        repository: Arc<dyn InstrumentRepository>,
    ) -> Self {
        Self {
            exchange,
            product,
            repository,
            cache: RwLock::new(FnvHashMap::default()),
        }
    }

    /// Resolve a symbol span. Unknown symbols are negatively cached so a
    /// stream of unconfigured instruments cannot force repeated lookups.
    pub fn resolve(&self, symbol: &str) -> Option<InstrumentId> {
        if let Some(cached) = self.cache.read().get(symbol) {
            return *cached;
        }

        let resolved = self
            .repository
            .find_by_symbol(symbol, self.product, self.exchange)
            .map(|instrument| instrument.id);

        self.cache.write().insert(SmolStr::new(symbol), resolved);
        resolved
    }

    /// Resolve a `{target}-{quote}` currency pair (Coinone style) without a
    /// heap allocation for typical code lengths.
    pub fn resolve_pair(&self, target: &str, quote: &str) -> Option<InstrumentId> {
        let symbol = format_smolstr!("{target}-{quote}");
        self.resolve(symbol.as_str())
    }
}
