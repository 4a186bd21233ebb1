//! Exchange abstractions and identifiers for the Arara trading stack
//!
//! This module provides the core [`ExchangeId`] enum used throughout the
//! system to identify different trading venues.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifies different exchanges/trading venues supported by Arara
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum ExchangeId {
    /// Binance cryptocurrency exchange (spot and USD-margined perpetuals)
    Binance,
    /// BitMEX cryptocurrency derivatives exchange
    Bitmex,
    /// Bithumb Korean cryptocurrency exchange
    Bithumb,
    /// Coinone Korean cryptocurrency exchange
    Coinone,
    /// Mock exchange for testing
    Mock,
}

impl ExchangeId {
    /// Returns true if this venue streams incremental depth deltas that
    /// require REST-snapshot reconciliation before replay.
    pub fn uses_incremental_depth(&self) -> bool {
        matches!(self, ExchangeId::Binance)
    }

    /// Returns true if this is a testing venue
    pub fn is_test(&self) -> bool {
        matches!(self, ExchangeId::Mock)
    }

    /// Returns the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "BINANCE",
            ExchangeId::Bitmex => "BITMEX",
            ExchangeId::Bithumb => "BITHUMB",
            ExchangeId::Coinone => "COINONE",
            ExchangeId::Mock => "MOCK",
        }
    }
}

impl FromStr for ExchangeId {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BINANCE" => Ok(ExchangeId::Binance),
            "BITMEX" => Ok(ExchangeId::Bitmex),
            "BITHUMB" => Ok(ExchangeId::Bithumb),
            "COINONE" => Ok(ExchangeId::Coinone),
            "MOCK" => Ok(ExchangeId::Mock),
            _ => Err(UnknownExchange(s.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognized venue name.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown exchange: {0}")]
pub struct UnknownExchange(pub String);

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_id_classification() {
        assert!(ExchangeId::Binance.uses_incremental_depth());
        assert!(!ExchangeId::Bitmex.uses_incremental_depth());
        assert!(!ExchangeId::Bithumb.uses_incremental_depth());

        assert!(ExchangeId::Mock.is_test());
        assert!(!ExchangeId::Coinone.is_test());
    }

    #[test]
    fn test_exchange_id_string_conversion() {
        assert_eq!(ExchangeId::Bitmex.as_str(), "BITMEX");
        assert_eq!(ExchangeId::Bitmex.to_string(), "BITMEX");

        assert_eq!(ExchangeId::from_str("binance").unwrap(), ExchangeId::Binance);
        assert_eq!(ExchangeId::from_str("COINONE").unwrap(), ExchangeId::Coinone);
        assert!(ExchangeId::from_str("invalid").is_err());
    }
}
