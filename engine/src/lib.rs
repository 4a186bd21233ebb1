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

//! # Engine
//!
//! Assembles the Arara stack for a host process: feed adapters behind their
//! connection cores, per-instrument quoting units (engine + market maker +
//! side quoters), event wiring between them, and ordered shutdown.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arara_engine::{builder::EngineBuilder, config::SystemConfig, logging::init_logging};
//!
//! init_logging();
//! let mut builder = EngineBuilder::new(SystemConfig::default(), repository);
//! // construct venue adapters against builder.dispatcher() / builder.pool()
//! builder.attach_adapter(adapter);
//! let engine = builder
//!     .with_gateway(gateway)
//!     .with_fair_value_provider(provider)
//!     .quote_single(instrument_id)
//!     .build()?;
//! engine.start().await?;
//! ```

/// All [`Error`](std::error::Error)s generated in Engine.
pub mod error;

/// Standardized logging initialization.
pub mod logging;

/// Host-facing configuration aggregation.
pub mod config;

/// [`EngineBuilder`](builder::EngineBuilder) and the assembled
/// [`Engine`](builder::Engine).
pub mod builder;

pub use builder::{Engine, EngineBuilder};
pub use config::SystemConfig;
pub use error::EngineError;
