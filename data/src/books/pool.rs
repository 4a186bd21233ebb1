//! Shared rent/return pool for depth-update entry buffers.
//!
//! Buffered updates own their entry buffer through [`PooledEntries`];
//! ownership moves with the update through the dispatch path and the buffer
//! returns to the pool exactly once, when the guard drops. Double returns
//! are therefore unrepresentable.

use crate::event::PriceLevelEntry;
use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Smallest buffer class handed out by the pool.
const MIN_CLASS: usize = 64;

/// Maximum idle buffers retained per size class.
const MAX_IDLE_PER_CLASS: usize = 64;

fn size_class(capacity: usize) -> usize {
    capacity.max(MIN_CLASS).next_power_of_two()
}

/// Shared pool of entry buffers keyed by size class.
#[derive(Debug, Default)]
pub struct EntryPool {
    idle: Mutex<fnv::FnvHashMap<usize, Vec<Vec<PriceLevelEntry>>>>,
    rents: AtomicU64,
    returns: AtomicU64,
}

impl EntryPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rent a buffer able to hold at least `capacity` entries.
    pub fn rent(self: &Arc<Self>, capacity: usize) -> PooledEntries {
        let class = size_class(capacity);
        let buffer = self
            .idle
            .lock()
            .get_mut(&class)
            .and_then(Vec::pop)
            .unwrap_or_else(|| Vec::with_capacity(class));

        self.rents.fetch_add(1, Ordering::Relaxed);
        PooledEntries {
            entries: Some(buffer),
            pool: Arc::clone(self),
        }
    }

    fn give_back(&self, mut buffer: Vec<PriceLevelEntry>) {
        self.returns.fetch_add(1, Ordering::Relaxed);
        buffer.clear();

        let class = size_class(buffer.capacity());
        let mut idle = self.idle.lock();
        let bucket = idle.entry(class).or_default();
        if bucket.len() < MAX_IDLE_PER_CLASS {
            bucket.push(buffer);
        }
    }

    /// Lifetime `(rents, returns)` counters; equal at steady state.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.rents.load(Ordering::Relaxed),
            self.returns.load(Ordering::Relaxed),
        )
    }
}

/// Owning guard over a rented entry buffer.
pub struct PooledEntries {
    entries: Option<Vec<PriceLevelEntry>>,
    pool: Arc<EntryPool>,
}

impl PooledEntries {
    pub fn as_slice(&self) -> &[PriceLevelEntry] {
        self
    }
}

impl Deref for PooledEntries {
    type Target = Vec<PriceLevelEntry>;

    fn deref(&self) -> &Self::Target {
        self.entries
            .as_ref()
            .expect("pooled buffer only vacated on drop")
    }
}

impl DerefMut for PooledEntries {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.entries
            .as_mut()
            .expect("pooled buffer only vacated on drop")
    }
}

impl Drop for PooledEntries {
    fn drop(&mut self) {
        if let Some(buffer) = self.entries.take() {
            self.pool.give_back(buffer);
        }
    }
}

impl fmt::Debug for PooledEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEntries")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
