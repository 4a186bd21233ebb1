//! Venue adapter implementations.
//!
//! Each venue module provides an [`AdapterOps`](crate::adapter::AdapterOps)
//! implementation plus its wire message model. The shared lifecycle lives in
//! [`connection`](crate::connection); only parsing, subscription wire
//! formats, heartbeat payloads, and authentication differ per venue.

/// Binance spot / USD-margined futures.
pub mod binance;

/// BitMEX derivatives.
pub mod bitmex;

/// Bithumb (KRW markets).
pub mod bithumb;

/// Coinone (KRW markets).
pub mod coinone;
