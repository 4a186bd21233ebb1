//! Normalised stream topics and the canonical per-connection subscription set.

use arara_markets::InstrumentId;
use fnv::FnvHashMap;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue-agnostic stream topic. Adapters map each topic onto their wire
/// channel names.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub enum Topic {
    /// Public trades.
    Trades,
    /// Best bid/ask quotes.
    BestQuotes,
    /// Incremental depth deltas (requires snapshot reconciliation).
    DepthUpdates,
    /// Venue-pushed full book images.
    BookSnapshots,
    /// Private order/execution stream.
    PrivateOrders,
}

impl Topic {
    /// Stable numeric identity carried on every
    /// [`MarketDataEvent`](crate::event::MarketDataEvent).
    pub fn id(self) -> u16 {
        match self {
            Topic::Trades => 1,
            Topic::BestQuotes => 2,
            Topic::DepthUpdates => 3,
            Topic::BookSnapshots => 4,
            Topic::PrivateOrders => 5,
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, Topic::PrivateOrders)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Trades => "trades",
            Topic::BestQuotes => "best_quotes",
            Topic::DepthUpdates => "depth_updates",
            Topic::BookSnapshots => "book_snapshots",
            Topic::PrivateOrders => "private_orders",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical `{instrument -> set<topic>}` memory of one connection.
///
/// Insertion order of topics is preserved so resubscription payloads are
/// deterministic across reconnects.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    inner: FnvHashMap<InstrumentId, IndexSet<Topic>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one pair; returns true when it was not present before.
    pub fn add(&mut self, instrument: InstrumentId, topic: Topic) -> bool {
        self.inner.entry(instrument).or_default().insert(topic)
    }

    /// Add the cross product of instruments and topics, returning only the
    /// pairs that were actually new. Makes `subscribe` idempotent.
    pub fn add_all(
        &mut self,
        instruments: &[InstrumentId],
        topics: &[Topic],
    ) -> Vec<(InstrumentId, Topic)> {
        let mut added = Vec::new();
        for &instrument in instruments {
            for &topic in topics {
                if self.add(instrument, topic) {
                    added.push((instrument, topic));
                }
            }
        }
        added
    }

    /// Remove one pair; returns true when it was present.
    pub fn remove(&mut self, instrument: InstrumentId, topic: Topic) -> bool {
        let Some(topics) = self.inner.get_mut(&instrument) else {
            return false;
        };
        let removed = topics.shift_remove(&topic);
        if topics.is_empty() {
            self.inner.remove(&instrument);
        }
        removed
    }

    /// Remove the cross product, returning the pairs that were present.
    pub fn remove_all(
        &mut self,
        instruments: &[InstrumentId],
        topics: &[Topic],
    ) -> Vec<(InstrumentId, Topic)> {
        let mut removed = Vec::new();
        for &instrument in instruments {
            for &topic in topics {
                if self.remove(instrument, topic) {
                    removed.push((instrument, topic));
                }
            }
        }
        removed
    }

    pub fn contains(&self, instrument: InstrumentId, topic: Topic) -> bool {
        self.inner
            .get(&instrument)
            .is_some_and(|topics| topics.contains(&topic))
    }

    pub fn topics_for(&self, instrument: InstrumentId) -> impl Iterator<Item = Topic> + '_ {
        self.inner
            .get(&instrument)
            .into_iter()
            .flat_map(|topics| topics.iter().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstrumentId, Topic)> + '_ {
        self.inner
            .iter()
            .flat_map(|(instrument, topics)| topics.iter().map(|topic| (*instrument, *topic)))
    }

    pub fn instruments(&self) -> impl Iterator<Item = InstrumentId> + '_ {
        self.inner.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_all_returns_only_new_pairs() {
        let mut set = SubscriptionSet::new();

        let added = set.add_all(
            &[InstrumentId(1), InstrumentId(2)],
            &[Topic::Trades, Topic::DepthUpdates],
        );
        assert_eq!(added.len(), 4);

        // Second subscribe is idempotent: only the genuinely new pair remains
        let added = set.add_all(&[InstrumentId(1)], &[Topic::Trades, Topic::BestQuotes]);
        assert_eq!(added, vec![(InstrumentId(1), Topic::BestQuotes)]);
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_remove_drops_empty_instruments() {
        let mut set = SubscriptionSet::new();
        set.add(InstrumentId(1), Topic::Trades);

        assert!(set.remove(InstrumentId(1), Topic::Trades));
        assert!(!set.remove(InstrumentId(1), Topic::Trades));
        assert!(set.is_empty());
        assert_eq!(set.instruments().count(), 0);
    }

    #[test]
    fn test_topic_ids_are_distinct() {
        let topics = [
            Topic::Trades,
            Topic::BestQuotes,
            Topic::DepthUpdates,
            Topic::BookSnapshots,
            Topic::PrivateOrders,
        ];
        let mut ids = topics.iter().map(|topic| topic.id()).collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), topics.len());
    }
}
