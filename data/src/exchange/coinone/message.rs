//! Coinone WebSocket message model.

use arara_integration::de::{de_price, de_quantity};
use arara_markets::{Price, Quantity};
use serde::Deserialize;
use serde_json::value::RawValue;

/// Push frame envelope.
#[derive(Debug, Deserialize)]
pub struct ResponseFrame<'a> {
    #[serde(borrow)]
    pub response_type: &'a str,
    #[serde(borrow, default)]
    pub channel: Option<&'a str>,
    #[serde(borrow, default)]
    pub data: Option<&'a RawValue>,
}

/// One side level of the book image.
#[derive(Debug, Deserialize)]
pub struct CoinoneLevel {
    #[serde(deserialize_with = "de_price")]
    pub price: Price,
    #[serde(deserialize_with = "de_quantity")]
    pub qty: Quantity,
}

/// `ORDERBOOK` channel payload: full book image per push.
#[derive(Debug, Deserialize)]
pub struct CoinoneOrderbook<'a> {
    #[serde(borrow)]
    pub quote_currency: &'a str,
    #[serde(borrow)]
    pub target_currency: &'a str,
    pub timestamp: u64,
    pub bids: Vec<CoinoneLevel>,
    pub asks: Vec<CoinoneLevel>,
}

/// `TRADE` channel payload.
#[derive(Debug, Deserialize)]
pub struct CoinoneTrade<'a> {
    #[serde(borrow)]
    pub quote_currency: &'a str,
    #[serde(borrow)]
    pub target_currency: &'a str,
    pub timestamp: u64,
    #[serde(deserialize_with = "de_price")]
    pub price: Price,
    #[serde(deserialize_with = "de_quantity")]
    pub qty: Quantity,
    /// True when the seller was the maker, ie/ the aggressor bought.
    #[serde(default)]
    pub is_seller_maker: bool,
}

/// Pong frames are the literal `{"response_type":"PONG"}`.
pub fn is_pong(payload: &[u8]) -> bool {
    const PONG: &[u8] = br#""response_type":"PONG""#;
    payload.windows(PONG.len()).any(|window| window == PONG)
}
