#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Data - Market Data Streaming
//!
//! WebSocket integration library for streaming normalised market data from
//! leading cryptocurrency exchanges - batteries included. Features:
//!
//! * **Standardization**: every venue is parsed into the same
//!   [`MarketDataEvent`](event::MarketDataEvent) model, with price levels
//!   carried in fixed-capacity chunked arrays.
//! * **Liveness**: each adapter owns a reconnecting connection core with
//!   inactivity/pong watchdogs and the shared fixed backoff ladder.
//! * **Gap-free depth**: venues with incremental depth flow through a
//!   per-instrument [`BookSynchronizer`](books::BookSynchronizer) that fuses
//!   REST snapshots with the live delta stream.
//! * **Extensibility**: venue behaviour is expressed through the
//!   [`AdapterOps`](adapter::AdapterOps) hook set; the lifecycle machinery is
//!   shared.

/// All [`Error`](std::error::Error)s generated in Data.
pub mod error;

/// The normalised [`MarketDataEvent`](event::MarketDataEvent) model and its
/// chunked price-level arrays.
pub mod event;

/// Normalised order status reports and fills from venue private streams.
pub mod order;

/// Stream [`Topic`](subscription::Topic)s and the canonical per-connection
/// [`SubscriptionSet`](subscription::SubscriptionSet).
pub mod subscription;

/// Depth snapshot model and the [`SnapshotFetcher`](snapshot::SnapshotFetcher)
/// / [`AuthTokenIssuer`](snapshot::AuthTokenIssuer) seams.
pub mod snapshot;

/// Symbol-span to [`InstrumentId`](arara_markets::InstrumentId) resolution
/// cache.
pub mod instrument_cache;

/// Venue hook set implemented by each adapter.
pub mod adapter;

/// Connection lifecycle: reconnect supervision, receive loop, heartbeat.
pub mod connection;

/// Pooled depth buffers and the per-instrument book synchronizer.
pub mod books;

/// Venue adapter implementations.
pub mod exchange;

/// [`FeedHandler`](feed::FeedHandler): adapter ownership and unified event
/// dispatch.
pub mod feed;

pub use error::DataError;
pub use event::{MarketDataEvent, MarketDataEventKind, PriceLevelEntry, PriceLevelEntryArray};
pub use feed::{EventDispatcher, FeedHandler};
