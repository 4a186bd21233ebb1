//! Bithumb WebSocket message model.
//!
//! Frames are typed by a top-level `type` field; numeric values arrive as
//! JSON numbers and parse through the shared fixed-point visitors.

use arara_integration::de::{de_opt_price, de_opt_quantity, de_price, de_quantity};
use arara_markets::{Price, Quantity, Side};
use serde::Deserialize;

/// Top-level frame type probe.
#[derive(Debug, Deserialize)]
pub struct TypeProbe<'a> {
    #[serde(rename = "type", borrow, default)]
    pub message_type: Option<&'a str>,
}

/// One level pair of the full book image.
#[derive(Debug, Deserialize)]
pub struct BithumbOrderbookUnit {
    #[serde(deserialize_with = "de_price")]
    pub ask_price: Price,
    #[serde(deserialize_with = "de_price")]
    pub bid_price: Price,
    #[serde(deserialize_with = "de_quantity")]
    pub ask_size: Quantity,
    #[serde(deserialize_with = "de_quantity")]
    pub bid_size: Quantity,
}

/// Venue-pushed full book image (up to 40 levels per side).
#[derive(Debug, Deserialize)]
pub struct BithumbOrderbook<'a> {
    #[serde(borrow)]
    pub code: &'a str,
    pub timestamp: u64,
    pub orderbook_units: Vec<BithumbOrderbookUnit>,
}

/// Public trade frame. `ask_bid` is the aggressor side (`BID` bought).
#[derive(Debug, Deserialize)]
pub struct BithumbTrade<'a> {
    #[serde(borrow)]
    pub code: &'a str,
    pub timestamp: u64,
    #[serde(deserialize_with = "de_price")]
    pub trade_price: Price,
    #[serde(deserialize_with = "de_quantity")]
    pub trade_volume: Quantity,
    #[serde(borrow)]
    pub ask_bid: &'a str,
    #[serde(default)]
    pub sequential_id: Option<u64>,
}

/// Private order frame behind the JWT channel.
#[derive(Debug, Deserialize)]
pub struct BithumbMyOrder<'a> {
    #[serde(borrow)]
    pub code: &'a str,
    #[serde(borrow, default)]
    pub uuid: Option<&'a str>,
    #[serde(borrow)]
    pub ask_bid: &'a str,
    #[serde(borrow)]
    pub state: &'a str,
    #[serde(default, deserialize_with = "de_opt_price")]
    pub price: Option<Price>,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub volume: Option<Quantity>,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub remaining_volume: Option<Quantity>,
    #[serde(default, deserialize_with = "de_opt_price")]
    pub trade_price: Option<Price>,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub trade_volume: Option<Quantity>,
    #[serde(borrow, default)]
    pub trade_uuid: Option<&'a str>,
    /// Client-supplied numeric identifier, when the order carried one.
    #[serde(borrow, default)]
    pub identifier: Option<&'a str>,
    pub timestamp: u64,
}

/// Parse the venue aggressor-side literal.
pub fn parse_ask_bid(ask_bid: &str) -> Option<Side> {
    match ask_bid {
        "BID" => Some(Side::Buy),
        "ASK" => Some(Side::Sell),
        _ => None,
    }
}
