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

//! # Integration
//!
//! Low-level, venue-agnostic building blocks used by the other Arara crates
//! to compose robust financial integrations:
//!
//! * **WebSocket protocol glue**: [`protocol::websocket`] wraps
//!   tokio-tungstenite behind small `connect` / close helpers.
//! * **Event hubs**: [`event::EventHub`] replaces multicast events with
//!   copy-on-write callback registries.
//! * **Reconnect scheduling**: [`retry::RetrySchedule`] encodes the fixed
//!   reconnect ladder shared by every adapter.
//! * **Cooperative shutdown**: [`shutdown`] provides a watch-backed
//!   cancellation token honored by all long-lived tasks.
//! * **Deserialization helpers**: [`de`] parses quoted venue decimals
//!   straight into fixed-point raw integers.
//! * **Signing**: [`auth`] holds the HMAC and JWT primitives private
//!   streams authenticate with.

/// All [`Error`](std::error::Error)s generated in Integration.
pub mod error;

/// `StreamParser`-level protocol glue; currently WebSocket only.
pub mod protocol;

/// Copy-on-write callback registries standing in for multicast events.
pub mod event;

/// Fixed reconnect backoff ladder.
pub mod retry;

/// Watch-backed cooperative cancellation.
pub mod shutdown;

/// Utilities to assist deserialisation.
pub mod de;

/// Venue signing primitives (HMAC hex signatures, HS256 JWTs).
pub mod auth;

/// Wall-clock helpers.
pub mod time;

pub use error::SocketError;
