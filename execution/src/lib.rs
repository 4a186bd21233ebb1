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

//! # Execution
//!
//! Order model and the [`OrderGateway`](gateway::OrderGateway) seam through
//! which quoters route orders to a venue. The gateway implementation itself
//! is an external collaborator; this crate fixes the contract and provides
//! the [`OrderBuilder`](builder::OrderBuilder) that mints client order ids.

/// All [`Error`](std::error::Error)s generated in Execution.
pub mod error;

/// [`NewOrder`](order::NewOrder) and order kind model.
pub mod order;

/// [`OrderGateway`](gateway::OrderGateway) trait.
pub mod gateway;

/// [`OrderBuilder`](builder::OrderBuilder): client order id minting and
/// order construction defaults.
pub mod builder;

/// Optional FX conversion seam.
pub mod fx;

pub use arara_data::order::{
    ClientOrderId, Fill, OrderStatus, OrderStatusReport,
};
pub use builder::OrderBuilder;
pub use error::ExecutionError;
pub use gateway::OrderGateway;
pub use order::{NewOrder, OrderKind};
