//! BitMEX WebSocket message model.
//!
//! Everything arrives as `{"table": ..., "action": ..., "data": [...]}`
//! frames; command responses carry `success`/`error` plus the echoed
//! request.

use arara_integration::de::{de_opt_price, de_opt_quantity, de_price, de_quantity};
use arara_markets::{Price, Quantity, Side};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::value::RawValue;

/// Table push frame.
#[derive(Debug, Deserialize)]
pub struct TableFrame<'a> {
    #[serde(borrow)]
    pub table: &'a str,
    #[serde(borrow)]
    pub action: &'a str,
    #[serde(borrow)]
    pub data: &'a RawValue,
}

/// Command (auth/subscribe) response frame.
#[derive(Debug, Deserialize)]
pub struct StatusFrame<'a> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(borrow, default)]
    pub error: Option<&'a str>,
    #[serde(borrow, default)]
    pub request: Option<&'a RawValue>,
}

impl StatusFrame<'_> {
    /// True when the echoed request was an `authKeyExpires` frame.
    pub fn is_auth_response(&self) -> bool {
        const OP: &[u8] = b"authKeyExpires";
        self.request
            .map(|request| request.get().as_bytes())
            .is_some_and(|raw| raw.windows(OP.len()).any(|window| window == OP))
    }
}

/// `quote` table item.
#[derive(Debug, Deserialize)]
pub struct BitmexQuote<'a> {
    #[serde(borrow)]
    pub symbol: &'a str,
    #[serde(borrow)]
    pub timestamp: &'a str,
    #[serde(rename = "bidPrice", default, deserialize_with = "de_opt_price")]
    pub bid_price: Option<Price>,
    #[serde(rename = "bidSize", default, deserialize_with = "de_opt_quantity")]
    pub bid_size: Option<Quantity>,
    #[serde(rename = "askPrice", default, deserialize_with = "de_opt_price")]
    pub ask_price: Option<Price>,
    #[serde(rename = "askSize", default, deserialize_with = "de_opt_quantity")]
    pub ask_size: Option<Quantity>,
}

/// `trade` table item. `side` is the aggressor side.
#[derive(Debug, Deserialize)]
pub struct BitmexTrade<'a> {
    #[serde(borrow)]
    pub symbol: &'a str,
    #[serde(borrow)]
    pub timestamp: &'a str,
    #[serde(borrow)]
    pub side: &'a str,
    #[serde(deserialize_with = "de_quantity")]
    pub size: Quantity,
    #[serde(deserialize_with = "de_price")]
    pub price: Price,
}

#[derive(Debug, Deserialize)]
struct RawLevel(
    #[serde(deserialize_with = "de_price")] Price,
    #[serde(deserialize_with = "de_quantity")] Quantity,
);

/// `orderBook10` table item: a venue-pushed 10-level book image.
#[derive(Debug, Deserialize)]
pub struct BitmexBook10<'a> {
    #[serde(borrow)]
    pub symbol: &'a str,
    #[serde(borrow)]
    pub timestamp: &'a str,
    bids: Vec<RawLevel>,
    asks: Vec<RawLevel>,
}

impl BitmexBook10<'_> {
    pub fn bids(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.bids.iter().map(|level| (level.0, level.1))
    }

    pub fn asks(&self) -> impl Iterator<Item = (Price, Quantity)> + '_ {
        self.asks.iter().map(|level| (level.0, level.1))
    }
}

/// `orderBookL2_25` table item. `partial`/`insert` carry `(id, price)`
/// pairs; `update`/`delete` carry only the id.
#[derive(Debug, Deserialize)]
pub struct BitmexL2Item<'a> {
    #[serde(borrow)]
    pub symbol: &'a str,
    pub id: u64,
    #[serde(borrow)]
    pub side: &'a str,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub size: Option<Quantity>,
    #[serde(default, deserialize_with = "de_opt_price")]
    pub price: Option<Price>,
}

/// `execution` table item.
#[derive(Debug, Deserialize)]
pub struct BitmexExecution<'a> {
    #[serde(rename = "execID", borrow, default)]
    pub execution_id: Option<&'a str>,
    #[serde(rename = "orderID", borrow, default)]
    pub order_id: Option<&'a str>,
    #[serde(rename = "clOrdID", borrow, default)]
    pub client_order_id: Option<&'a str>,
    #[serde(borrow)]
    pub symbol: &'a str,
    #[serde(borrow)]
    pub side: &'a str,
    #[serde(rename = "ordStatus", borrow)]
    pub order_status: &'a str,
    #[serde(default, deserialize_with = "de_opt_price")]
    pub price: Option<Price>,
    #[serde(rename = "orderQty", default, deserialize_with = "de_opt_quantity")]
    pub order_quantity: Option<Quantity>,
    #[serde(rename = "lastPx", default, deserialize_with = "de_opt_price")]
    pub last_price: Option<Price>,
    #[serde(rename = "lastQty", default, deserialize_with = "de_opt_quantity")]
    pub last_quantity: Option<Quantity>,
    #[serde(rename = "leavesQty", default, deserialize_with = "de_opt_quantity")]
    pub leaves_quantity: Option<Quantity>,
    #[serde(borrow)]
    pub timestamp: &'a str,
}

/// Parse a venue side literal.
pub fn parse_side(side: &str) -> Option<Side> {
    match side {
        "Buy" => Some(Side::Buy),
        "Sell" => Some(Side::Sell),
        _ => None,
    }
}

/// Parse an ISO-8601 venue timestamp into unix epoch milliseconds.
pub fn parse_timestamp_ms(timestamp: &str) -> Option<u64> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|parsed| parsed.timestamp_millis().max(0) as u64)
}
