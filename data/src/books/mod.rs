//! Pooled depth buffers and the per-instrument book synchronizer.

/// Shared rent/return pool for depth-update entry buffers.
pub mod pool;

/// REST snapshot + WS delta fusion state machine.
pub mod sync;

pub use pool::{EntryPool, PooledEntries};
pub use sync::{BookSynchronizer, BufferedDepthUpdate, SequenceRule, SyncPhase};
