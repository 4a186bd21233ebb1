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

//! # Markets
//!
//! Core market value types shared by every Arara crate: fixed-point
//! [`Price`] and [`Quantity`], [`Side`], venue identity via [`ExchangeId`],
//! and the [`Instrument`] model with its boot-time [`InstrumentIndex`].
//!
//! Prices and quantities are raw `i64` tick counts with an explicit decimal
//! scale; all hot-path arithmetic stays on raw integers and conversion
//! to/from [`rust_decimal::Decimal`] only happens at the edges.

/// Fixed-point [`Price`] and [`Quantity`] value types.
pub mod price;

/// Order / trade [`Side`].
pub mod side;

/// Venue identity via [`ExchangeId`].
pub mod exchange;

/// [`Instrument`] identity and static properties.
pub mod instrument;

/// [`InstrumentRepository`] lookup seam and the in-memory [`InstrumentIndex`].
pub mod repository;

pub use exchange::ExchangeId;
pub use instrument::{Currency, Instrument, InstrumentId, ProductType};
pub use price::{Price, Quantity, FIXED_POINT_SCALE};
pub use repository::{IndexError, InstrumentIndex, InstrumentRepository};
pub use side::Side;
