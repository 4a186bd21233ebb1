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

//! # Quoting
//!
//! The fair-value driven quoting stack:
//!
//! * [`QuotingEngine`](engine::QuotingEngine) consumes fair value updates
//!   and fills, applies spreads, skew, grouping and inventory caps, and
//!   emits [`QuotePair`](quote::QuotePair) targets.
//! * [`MarketMaker`](maker::MarketMaker) coalesces targets through a
//!   single-slot token and drives one quoter per side.
//! * [`SideQuoter`](quoter::SideQuoter) implementations reconcile desired
//!   price/size against live venue orders under rate limits, with hitting
//!   logic safeguards.

/// All [`Error`](std::error::Error)s generated in Quoting.
pub mod error;

/// Quoting parameter set.
pub mod config;

/// [`Quote`](quote::Quote) / [`QuotePair`](quote::QuotePair) targets.
pub mod quote;

/// Fair value provider seam.
pub mod fair_value;

/// Shared best bid/ask view consumed by hitting logic.
pub mod book;

/// Available-position seam for spot-sell safety.
pub mod position;

/// Shared event hubs of the quoting stack.
pub mod events;

/// Target-side validation.
pub mod validator;

/// Per-side quoters.
pub mod quoter;

/// Per-instrument coordination of the two quoters.
pub mod maker;

/// The quoting engine.
pub mod engine;

pub use config::{HittingLogic, QuotingParameters};
pub use engine::QuotingEngine;
pub use error::QuotingError;
pub use maker::MarketMaker;
pub use quote::{Quote, QuotePair};
