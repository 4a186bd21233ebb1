//! Quoting parameter set.

use arara_markets::Quantity;
use serde::{Deserialize, Serialize};

/// Passive/aggressive safeguard applied to target quote prices.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum HittingLogic {
    /// No adjustment.
    AllowAll,
    /// Clamp to our side's best: never quote through the book.
    OurBest,
    /// Place one tick inside the opposite best when the target would
    /// cross; falls back to [`Self::OurBest`] on a one-tick spread.
    Pennying,
}

/// Engine parameters. Spreads are relative to fair value in basis points
/// and may go negative under skew.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotingParameters {
    pub bid_spread_bp: f64,
    pub ask_spread_bp: f64,
    /// Quoted size per side (and per layer for layered quoters).
    pub order_size: Quantity,
    /// Spread adjustment per `order_size` of net one-sided fills.
    pub skew_bp: f64,
    /// Price bucket coarsening; `0` disables grouping.
    pub grouping_bp: f64,
    pub hitting_logic: HittingLogic,
    /// Applied to every limit order from the engine.
    pub post_only: bool,
    /// Cumulative buy-fill cap; the bid side is dropped at the cap.
    /// Zero disables the cap.
    pub max_cum_bid_fills: Quantity,
    /// Cumulative sell-fill cap; the ask side is dropped at the cap.
    /// Zero disables the cap.
    pub max_cum_ask_fills: Quantity,
    /// Quoting pause after a full fill, milliseconds.
    pub cooldown_on_fill_ms: u64,
}

impl Default for QuotingParameters {
    fn default() -> Self {
        Self {
            bid_spread_bp: -10.0,
            ask_spread_bp: 10.0,
            order_size: Quantity::ZERO,
            skew_bp: 0.0,
            grouping_bp: 0.0,
            hitting_logic: HittingLogic::AllowAll,
            post_only: false,
            max_cum_bid_fills: Quantity::ZERO,
            max_cum_ask_fills: Quantity::ZERO,
            cooldown_on_fill_ms: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = QuotingParameters::default();
        assert_eq!(params.cooldown_on_fill_ms, 3000);
        assert_eq!(params.grouping_bp, 0.0);
        assert_eq!(params.hitting_logic, HittingLogic::AllowAll);
        assert!(!params.post_only);
    }

    #[test]
    fn test_deserialize_partial_override() {
        let params: QuotingParameters = serde_json::from_str(
            r#"{ "bid_spread_bp": -5.0, "hitting_logic": "Pennying", "post_only": true }"#,
        )
        .unwrap();
        assert_eq!(params.bid_spread_bp, -5.0);
        assert_eq!(params.hitting_logic, HittingLogic::Pennying);
        assert!(params.post_only);
        // Untouched fields keep their defaults
        assert_eq!(params.cooldown_on_fill_ms, 3000);
    }
}
