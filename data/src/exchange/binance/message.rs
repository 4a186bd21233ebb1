//! Binance WebSocket message model.
//!
//! All DTOs borrow from the raw message region; quoted decimals parse
//! straight into fixed-point via the shared `de` helpers.

use crate::event::PriceLevelEntry;
use arara_integration::de::{de_price, de_quantity};
use arara_markets::{Price, Quantity, Side};
use serde::de::{DeserializeSeed, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::fmt;

/// Combined-stream envelope: `{"stream":"btcusdt@aggTrade","data":{...}}`.
#[derive(Debug, Deserialize)]
pub struct CombinedFrame<'a> {
    #[serde(borrow)]
    pub stream: &'a str,
    #[serde(borrow)]
    pub data: &'a RawValue,
}

impl CombinedFrame<'_> {
    /// Channel part of the stream name, eg/ `depth@100ms` from
    /// `btcusdt@depth@100ms`.
    pub fn channel(&self) -> Option<&str> {
        self.stream.split_once('@').map(|(_, channel)| channel)
    }
}

/// Aggregate trade event.
///
/// ### Raw Payload Examples
/// ```json
/// {
///     "e": "aggTrade", "E": 1672515782136, "s": "BTCUSDT",
///     "a": 5933014, "p": "0.001", "q": "100",
///     "f": 100, "l": 105, "T": 1672515782136, "m": true
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct BinanceAggTrade<'a> {
    #[serde(rename = "s", borrow)]
    pub symbol: &'a str,
    #[serde(rename = "a")]
    pub trade_id: u64,
    #[serde(rename = "p", deserialize_with = "de_price")]
    pub price: Price,
    #[serde(rename = "q", deserialize_with = "de_quantity")]
    pub quantity: Quantity,
    #[serde(rename = "T")]
    pub trade_time: u64,
    /// True when the buyer is the maker, ie/ the aggressor sold.
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl BinanceAggTrade<'_> {
    pub fn aggressor_side(&self) -> Side {
        if self.buyer_is_maker {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

/// Best bid/ask ticker. A zero size means the best level vanished and is
/// treated as a level delete.
#[derive(Debug, Deserialize)]
pub struct BinanceBookTicker<'a> {
    #[serde(rename = "u")]
    pub update_id: u64,
    #[serde(rename = "s", borrow)]
    pub symbol: &'a str,
    #[serde(rename = "b", deserialize_with = "de_price")]
    pub bid_price: Price,
    #[serde(rename = "B", deserialize_with = "de_quantity")]
    pub bid_quantity: Quantity,
    #[serde(rename = "a", deserialize_with = "de_price")]
    pub ask_price: Price,
    #[serde(rename = "A", deserialize_with = "de_quantity")]
    pub ask_quantity: Quantity,
    /// Only the futures stream carries an event time.
    #[serde(rename = "E", default)]
    pub event_time: Option<u64>,
}

/// Incremental depth delta envelope. Level arrays stay raw so they can be
/// parsed straight into a pooled buffer.
#[derive(Debug, Deserialize)]
pub struct BinanceDepthUpdate<'a> {
    #[serde(rename = "s", borrow)]
    pub symbol: &'a str,
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub last_update_id: u64,
    /// Futures only.
    #[serde(rename = "pu", default)]
    pub prev_last_update_id: Option<u64>,
    #[serde(rename = "b", borrow)]
    pub bids: &'a RawValue,
    #[serde(rename = "a", borrow)]
    pub asks: &'a RawValue,
}

/// Private user-data event probe.
#[derive(Debug, Deserialize)]
pub struct EventTypeProbe<'a> {
    #[serde(rename = "e", borrow, default)]
    pub event_type: Option<&'a str>,
}

/// Private execution report.
#[derive(Debug, Deserialize)]
pub struct BinanceExecutionReport<'a> {
    #[serde(rename = "s", borrow)]
    pub symbol: &'a str,
    #[serde(rename = "c", borrow)]
    pub client_order_id: &'a str,
    #[serde(rename = "S", borrow)]
    pub side: &'a str,
    #[serde(rename = "X", borrow)]
    pub order_status: &'a str,
    #[serde(rename = "i")]
    pub exchange_order_id: u64,
    #[serde(rename = "t", default)]
    pub trade_id: Option<i64>,
    #[serde(rename = "p", deserialize_with = "de_price")]
    pub price: Price,
    #[serde(rename = "q", deserialize_with = "de_quantity")]
    pub quantity: Quantity,
    #[serde(rename = "L", deserialize_with = "de_price")]
    pub last_price: Price,
    #[serde(rename = "l", deserialize_with = "de_quantity")]
    pub last_quantity: Quantity,
    #[serde(rename = "z", deserialize_with = "de_quantity")]
    pub cumulative_quantity: Quantity,
    #[serde(rename = "T")]
    pub transaction_time: u64,
}

#[derive(Debug, Deserialize)]
struct RawLevel(
    #[serde(deserialize_with = "de_price")] Price,
    #[serde(deserialize_with = "de_quantity")] Quantity,
);

/// Parse a raw `[["price","qty"], ...]` array directly into `out`,
/// tagging every level with `side`. No intermediate collection is built.
pub fn parse_levels_into(
    raw: &RawValue,
    side: Side,
    out: &mut Vec<PriceLevelEntry>,
) -> Result<(), serde_json::Error> {
    struct LevelSeq<'o> {
        side: Side,
        out: &'o mut Vec<PriceLevelEntry>,
    }

    impl<'de> DeserializeSeed<'de> for LevelSeq<'_> {
        type Value = ();

        fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
        where
            D: Deserializer<'de>,
        {
            struct LevelVisitor<'o> {
                side: Side,
                out: &'o mut Vec<PriceLevelEntry>,
            }

            impl<'de> Visitor<'de> for LevelVisitor<'_> {
                type Value = ();

                fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                    formatter.write_str("a sequence of [price, quantity] levels")
                }

                fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
                where
                    A: SeqAccess<'de>,
                {
                    while let Some(RawLevel(price, quantity)) = seq.next_element::<RawLevel>()? {
                        self.out.push(PriceLevelEntry::new(self.side, price, quantity));
                    }
                    Ok(())
                }
            }

            deserializer.deserialize_seq(LevelVisitor {
                side: self.side,
                out: self.out,
            })
        }
    }

    let mut deserializer = serde_json::Deserializer::from_str(raw.get());
    LevelSeq { side, out }.deserialize(&mut deserializer)
}

/// Subscription acks carry `"result"` (SUBSCRIBE/UNSUBSCRIBE responses) or a
/// bare top-level `"id"`.
pub fn is_subscription_ack(payload: &[u8]) -> bool {
    const RESULT_KEY: &[u8] = b"\"result\"";
    payload.windows(RESULT_KEY.len()).any(|window| window == RESULT_KEY)
        || payload.starts_with(b"{\"id\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_de_combined_frame_channel() {
        let payload =
            br#"{"stream":"btcusdt@depth@100ms","data":{"e":"depthUpdate"}}"#;
        let frame: CombinedFrame<'_> = serde_json::from_slice(payload).unwrap();
        assert_eq!(frame.channel(), Some("depth@100ms"));
    }

    #[test]
    fn test_de_agg_trade() {
        let payload = br#"
            {
                "e": "aggTrade", "E": 1672515782136, "s": "BTCUSDT",
                "a": 5933014, "p": "23000.50", "q": "0.25",
                "f": 100, "l": 105, "T": 1672515782135, "m": true
            }
        "#;

        let trade: BinanceAggTrade<'_> = serde_json::from_slice(payload).unwrap();
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.trade_id, 5_933_014);
        assert_eq!(trade.price, Price::from_raw(2_300_050_000_000));
        assert_eq!(trade.quantity, Quantity::from_raw(25_000_000));
        assert_eq!(trade.aggressor_side(), Side::Sell);
    }

    #[test]
    fn test_de_book_ticker_with_vanished_level() {
        let payload = br#"
            {
                "u": 400900217, "s": "BNBUSDT",
                "b": "25.35190000", "B": "0.00000000",
                "a": "25.36520000", "A": "40.66000000"
            }
        "#;

        let ticker: BinanceBookTicker<'_> = serde_json::from_slice(payload).unwrap();
        assert_eq!(ticker.update_id, 400_900_217);
        // Zero-size best bid is carried verbatim; downstream treats it as a
        // level delete
        assert!(ticker.bid_quantity.is_zero());
        assert_eq!(ticker.event_time, None);
    }

    #[test]
    fn test_de_depth_update_with_pooled_levels() {
        let payload = br#"
            {
                "e": "depthUpdate", "E": 1571889248277, "s": "BTCUSDT",
                "U": 157, "u": 160, "pu": 149,
                "b": [["0.0024", "10"]],
                "a": [["0.0026", "100"], ["0.0027", "0"]]
            }
        "#;

        let update: BinanceDepthUpdate<'_> = serde_json::from_slice(payload).unwrap();
        assert_eq!(update.first_update_id, 157);
        assert_eq!(update.last_update_id, 160);
        assert_eq!(update.prev_last_update_id, Some(149));

        let mut entries = Vec::new();
        parse_levels_into(update.bids, Side::Buy, &mut entries).unwrap();
        parse_levels_into(update.asks, Side::Sell, &mut entries).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].side, Side::Buy);
        assert_eq!(entries[0].price, Price::from_raw(240_000));
        assert_eq!(entries[1].side, Side::Sell);
        // Zero quantity level removal survives verbatim
        assert!(entries[2].is_removal());
    }

    #[test]
    fn test_de_execution_report() {
        let payload = br#"
            {
                "e": "executionReport", "E": 1499405658658, "s": "ETHBTC",
                "c": "9001", "S": "BUY", "o": "LIMIT", "f": "GTC",
                "q": "1.00000000", "p": "0.10264410",
                "X": "PARTIALLY_FILLED", "i": 4293153,
                "l": "0.40000000", "z": "0.40000000", "L": "0.10264410",
                "t": 77, "T": 1499405658657
            }
        "#;

        let report: BinanceExecutionReport<'_> = serde_json::from_slice(payload).unwrap();
        assert_eq!(report.client_order_id, "9001");
        assert_eq!(report.order_status, "PARTIALLY_FILLED");
        assert_eq!(report.exchange_order_id, 4_293_153);
        assert_eq!(report.last_quantity, Quantity::from_raw(40_000_000));
        assert_eq!(report.trade_id, Some(77));
    }

    #[test]
    fn test_subscription_ack_detection() {
        assert!(is_subscription_ack(br#"{"result":null,"id":1700000000000}"#));
        assert!(is_subscription_ack(br#"{"id":42}"#));
        assert!(!is_subscription_ack(
            br#"{"stream":"btcusdt@aggTrade","data":{}}"#
        ));
    }
}
