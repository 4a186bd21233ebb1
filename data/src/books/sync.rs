//! Per-instrument order book synchronization.
//!
//! Venues with incremental depth publish deltas that are only meaningful
//! relative to a REST snapshot. The [`BookSynchronizer`] buffers deltas until
//! a snapshot commits, replays the buffer in order, then validates the live
//! stream against the venue sequence rule, resynchronizing on any gap.

use crate::books::pool::PooledEntries;
use crate::event::{chunk_events, EventHeader, MarketDataEventKind};
use crate::feed::EventDispatcher;
use crate::snapshot::{DepthSnapshot, SnapshotFetcher};
use crate::subscription::Topic;
use arara_markets::{Instrument, InstrumentId, ProductType, Side};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default REST snapshot depth limits per product type.
pub fn default_snapshot_limit(product: ProductType) -> u32 {
    match product {
        ProductType::PerpetualFuture => 1000,
        ProductType::Spot => 5000,
    }
}

/// Venue-specific continuity rule for depth update sequences.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SequenceRule {
    /// `first_update_id <= last_dispatched + 1 <= last_update_id`.
    Spot,
    /// `prev_last_update_id == last_dispatched`.
    Derivatives,
}

impl SequenceRule {
    pub fn for_product(product: ProductType) -> Self {
        match product {
            ProductType::Spot => SequenceRule::Spot,
            ProductType::PerpetualFuture => SequenceRule::Derivatives,
        }
    }
}

/// Synchronizer lifecycle phase.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SyncPhase {
    Idle,
    Syncing,
    Live,
    Resyncing,
    Disposed,
}

/// One parsed depth delta, entries rented from the shared [`EntryPool`].
pub struct BufferedDepthUpdate {
    /// First update id covered by this delta (`U`).
    pub first_update_id: u64,
    /// Last update id covered by this delta (`u`).
    pub last_update_id: u64,
    /// Last update id of the previous delta (`pu`, derivatives only).
    pub prev_last_update_id: u64,
    /// Venue event time (`E`), unix epoch milliseconds.
    pub event_time: u64,
    pub entries: PooledEntries,
}

impl fmt::Debug for BufferedDepthUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedDepthUpdate")
            .field("first_update_id", &self.first_update_id)
            .field("last_update_id", &self.last_update_id)
            .field("prev_last_update_id", &self.prev_last_update_id)
            .field("entries", &self.entries.len())
            .finish()
    }
}

enum LiveValidation {
    Dispatch,
    Stale,
    Gap,
}

struct SyncInner {
    phase: SyncPhase,
    snapshot_loaded: bool,
    /// `-1` until a snapshot commits.
    last_update_id: i64,
    /// The first post-snapshot live delta is validated with the snapshot
    /// overlap rule instead of the strict continuity rule, once.
    first_live_exempt: bool,
    buffer: VecDeque<BufferedDepthUpdate>,
    fetch_in_flight: bool,
    /// Bumped by every `start_sync`; stale fetches commit against an older
    /// epoch and are discarded.
    epoch: u64,
}

/// Per-instrument state machine fusing a REST snapshot with live deltas
/// into a gap-free, in-order chunked event stream.
pub struct BookSynchronizer {
    instrument: Instrument,
    rule: SequenceRule,
    snapshot_limit: u32,
    fetcher: Arc<dyn SnapshotFetcher>,
    dispatcher: Arc<EventDispatcher>,
    state: Mutex<SyncInner>,
}

impl fmt::Debug for BookSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookSynchronizer")
            .field("instrument", &self.instrument.id)
            .field("rule", &self.rule)
            .field("phase", &self.phase())
            .finish()
    }
}

impl BookSynchronizer {
    pub fn new(
        instrument: Instrument,
        fetcher: Arc<dyn SnapshotFetcher>,
        dispatcher: Arc<EventDispatcher>,
        snapshot_limit: Option<u32>,
    ) -> Arc<Self> {
        let rule = SequenceRule::for_product(instrument.product);
        let snapshot_limit =
            snapshot_limit.unwrap_or_else(|| default_snapshot_limit(instrument.product));

        Arc::new(Self {
            instrument,
            rule,
            snapshot_limit,
            fetcher,
            dispatcher,
            state: Mutex::new(SyncInner {
                phase: SyncPhase::Idle,
                snapshot_loaded: false,
                last_update_id: -1,
                first_live_exempt: false,
                buffer: VecDeque::new(),
                fetch_in_flight: false,
                epoch: 0,
            }),
        })
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.instrument.id
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.lock().phase
    }

    /// Reset synchronizer state and spawn a snapshot fetch.
    ///
    /// Safe to call repeatedly; an in-flight fetch from an earlier call is
    /// superseded through the epoch counter.
    pub fn start_sync(self: &Arc<Self>) {
        let Some(epoch) = self.begin_sync() else {
            return;
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.fetch_and_commit(epoch).await;
        });
    }

    /// Clear state under the lock and arm a new sync epoch. Returns `None`
    /// when the synchronizer is disposed.
    pub(crate) fn begin_sync(&self) -> Option<u64> {
        let mut inner = self.state.lock();
        if inner.phase == SyncPhase::Disposed {
            return None;
        }

        // Buffered entries return to the pool as the queue drops them
        inner.buffer.clear();
        inner.snapshot_loaded = false;
        inner.last_update_id = -1;
        inner.first_live_exempt = false;
        inner.phase = match inner.phase {
            SyncPhase::Live | SyncPhase::Resyncing => SyncPhase::Resyncing,
            _ => SyncPhase::Syncing,
        };
        inner.epoch += 1;
        inner.fetch_in_flight = true;
        Some(inner.epoch)
    }

    /// Fetch a snapshot outside the lock and commit it on re-entry.
    pub(crate) async fn fetch_and_commit(self: &Arc<Self>, epoch: u64) {
        let snapshot = self
            .fetcher
            .get_depth_snapshot(&self.instrument, self.snapshot_limit)
            .await;

        match snapshot {
            Ok(snapshot) => self.commit_snapshot(snapshot, epoch),
            Err(error) => {
                // Prior state is kept; the next resubscribe-triggered
                // start_sync retries.
                warn!(
                    instrument = %self.instrument,
                    %error,
                    "depth snapshot fetch failed"
                );
                self.state.lock().fetch_in_flight = false;
            }
        }
    }

    /// Ingest one parsed depth delta from the live stream.
    pub fn on_depth_update(self: &Arc<Self>, update: BufferedDepthUpdate) {
        let mut inner = self.state.lock();
        if inner.phase == SyncPhase::Disposed {
            return;
        }

        if !inner.snapshot_loaded {
            inner.buffer.push_back(update);
            return;
        }

        let last = inner.last_update_id as u64;
        match validate_live(self.rule, last, inner.first_live_exempt, &update) {
            LiveValidation::Dispatch => {
                inner.first_live_exempt = false;
                inner.last_update_id = update.last_update_id as i64;
                self.dispatch_update(&update);
            }
            LiveValidation::Stale => {}
            LiveValidation::Gap => {
                let gap = crate::error::DataError::InvalidSequence {
                    prev_last_update_id: last,
                    first_update_id: update.first_update_id,
                };
                debug!(
                    instrument = %self.instrument,
                    error = %gap,
                    "depth sequence gap, resynchronizing"
                );
                inner.snapshot_loaded = false;
                inner.phase = SyncPhase::Resyncing;
                drop(inner);
                self.schedule_resync();
            }
        }
    }

    /// Terminal: stop dispatching and release buffered entries.
    pub fn dispose(&self) {
        let mut inner = self.state.lock();
        inner.phase = SyncPhase::Disposed;
        inner.buffer.clear();
        inner.snapshot_loaded = false;
    }

    /// Re-run `start_sync` from an independent task; never holds the state
    /// lock across the spawn.
    fn schedule_resync(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.start_sync();
        });
    }

    fn commit_snapshot(self: &Arc<Self>, snapshot: DepthSnapshot, epoch: u64) {
        let mut inner = self.state.lock();
        inner.fetch_in_flight = false;
        if inner.epoch != epoch || inner.phase == SyncPhase::Disposed {
            return;
        }

        let snapshot_id = snapshot.last_update_id;

        // Drop buffered deltas the snapshot already covers
        while let Some(head) = inner.buffer.front() {
            let stale = match self.rule {
                SequenceRule::Derivatives => head.last_update_id < snapshot_id,
                SequenceRule::Spot => head.last_update_id <= snapshot_id,
            };
            if stale {
                inner.buffer.pop_front();
            } else {
                break;
            }
        }

        // The remaining head must overlap the snapshot, otherwise the
        // snapshot raced too far behind the stream: restart.
        if let Some(head) = inner.buffer.front() {
            let overlaps = match self.rule {
                SequenceRule::Derivatives => {
                    head.first_update_id <= snapshot_id && snapshot_id <= head.last_update_id
                }
                SequenceRule::Spot => head.first_update_id <= snapshot_id + 1,
            };
            if !overlaps {
                debug!(
                    instrument = %self.instrument,
                    snapshot_id,
                    buffered_first = head.first_update_id,
                    "buffered stream does not overlap snapshot, restarting sync"
                );
                inner.buffer.clear();
                drop(inner);
                self.schedule_resync();
                return;
            }
        }

        self.dispatch_snapshot(&snapshot);
        inner.last_update_id = snapshot_id as i64;
        inner.first_live_exempt = true;

        // Replay the buffer in order under the same lock
        while let Some(update) = inner.buffer.pop_front() {
            let last = inner.last_update_id as u64;
            match validate_live(self.rule, last, inner.first_live_exempt, &update) {
                LiveValidation::Dispatch => {
                    inner.first_live_exempt = false;
                    inner.last_update_id = update.last_update_id as i64;
                    self.dispatch_update(&update);
                }
                LiveValidation::Stale => {}
                LiveValidation::Gap => {
                    debug!(
                        instrument = %self.instrument,
                        "gap inside buffered replay, restarting sync"
                    );
                    inner.buffer.clear();
                    drop(inner);
                    self.schedule_resync();
                    return;
                }
            }
        }

        inner.snapshot_loaded = true;
        inner.phase = SyncPhase::Live;
    }

    fn dispatch_snapshot(&self, snapshot: &DepthSnapshot) {
        let entries = snapshot
            .bids
            .iter()
            .map(|&(price, quantity)| crate::event::PriceLevelEntry::new(Side::Buy, price, quantity))
            .chain(snapshot.asks.iter().map(|&(price, quantity)| {
                crate::event::PriceLevelEntry::new(Side::Sell, price, quantity)
            }))
            .collect::<Vec<_>>();

        let header = EventHeader {
            sequence: snapshot.last_update_id,
            prev_sequence: snapshot.last_update_id,
            timestamp: snapshot.message_output_time,
            instrument_id: self.instrument.id,
            exchange: self.instrument.exchange,
            topic_id: Topic::DepthUpdates.id(),
        };

        for event in chunk_events(
            header,
            MarketDataEventKind::Snapshot,
            MarketDataEventKind::Update,
            &entries,
        ) {
            self.dispatcher.publish_market_data(&event);
        }
    }

    fn dispatch_update(&self, update: &BufferedDepthUpdate) {
        let prev_sequence = match self.rule {
            SequenceRule::Derivatives => update.prev_last_update_id,
            SequenceRule::Spot => update.first_update_id,
        };

        let header = EventHeader {
            sequence: update.last_update_id,
            prev_sequence,
            timestamp: update.event_time,
            instrument_id: self.instrument.id,
            exchange: self.instrument.exchange,
            topic_id: Topic::DepthUpdates.id(),
        };

        for event in chunk_events(
            header,
            MarketDataEventKind::Update,
            MarketDataEventKind::Update,
            update.entries.as_slice(),
        ) {
            self.dispatcher.publish_market_data(&event);
        }
    }
}

fn validate_live(
    rule: SequenceRule,
    last: u64,
    exempt: bool,
    update: &BufferedDepthUpdate,
) -> LiveValidation {
    let stale = match (rule, exempt) {
        // Derivatives accept the overlap delta whose u equals the snapshot id
        (SequenceRule::Derivatives, true) => update.last_update_id < last,
        _ => update.last_update_id <= last,
    };
    if stale {
        return LiveValidation::Stale;
    }

    let continuous = match (rule, exempt) {
        (SequenceRule::Derivatives, true) => update.first_update_id <= last,
        (SequenceRule::Derivatives, false) => update.prev_last_update_id == last,
        (SequenceRule::Spot, _) => update.first_update_id <= last + 1,
    };

    if continuous {
        LiveValidation::Dispatch
    } else {
        LiveValidation::Gap
    }
}
