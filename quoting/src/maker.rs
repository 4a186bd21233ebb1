//! Per-instrument coordination of the bid and ask quoters.
//!
//! `update_quote_target` never blocks on quoting work: targets land in a
//! single pending slot and a single-slot processing token elects exactly
//! one caller to run the dispatch loop. While the loop runs, newer targets
//! simply overwrite the slot; only the latest survives.

use crate::error::QuotingError;
use crate::events::{QuoteStatusChanged, QuotingEvents};
use crate::quote::QuotePair;
use crate::quoter::SideQuoter;
use crate::validator::{QuoteStatus, QuoteValidator};
use arara_markets::{InstrumentId, Side};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Coordinates one bid and one ask quoter for a single instrument.
pub struct MarketMaker {
    instrument_id: InstrumentId,
    bid: Arc<dyn SideQuoter>,
    ask: Arc<dyn SideQuoter>,
    validator: QuoteValidator,
    events: Arc<QuotingEvents>,
    pending: Mutex<Option<QuotePair>>,
    processing: AtomicBool,
    paused: AtomicBool,
    last_status: Mutex<Option<(QuoteStatus, QuoteStatus)>>,
}

impl fmt::Debug for MarketMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketMaker")
            .field("instrument", &self.instrument_id)
            .field("paused", &self.paused.load(Ordering::Relaxed))
            .finish()
    }
}

impl MarketMaker {
    pub fn new(
        instrument_id: InstrumentId,
        bid: Arc<dyn SideQuoter>,
        ask: Arc<dyn SideQuoter>,
        validator: QuoteValidator,
        events: Arc<QuotingEvents>,
    ) -> Arc<Self> {
        Arc::new(Self {
            instrument_id,
            bid,
            ask,
            validator,
            events,
            pending: Mutex::new(None),
            processing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            last_status: Mutex::new(None),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Pause or resume quoting; pausing cancels both sides.
    pub async fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        if paused {
            let (bid, ask) = tokio::join!(self.bid.cancel_quote(), self.ask.cancel_quote());
            for (side, result) in [(Side::Buy, bid), (Side::Sell, ask)] {
                if let Err(error) = result {
                    warn!(
                        instrument = %self.instrument_id,
                        %side,
                        %error,
                        "cancel on pause failed"
                    );
                }
            }
        }
    }

    /// Overwrite the pending target slot and, if no processor is running,
    /// become the processor. Never blocks behind an in-flight iteration.
    pub async fn update_quote_target(&self, target: QuotePair) {
        *self.pending.lock() = Some(target);

        loop {
            if self
                .processing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // The in-flight processor picks the newer target up after
                // its current iteration
                return;
            }

            loop {
                let target = self.pending.lock().take();
                let Some(target) = target else {
                    break;
                };
                self.process(target).await;
            }

            self.processing.store(false, Ordering::Release);

            // A target slotted between the empty check and the token
            // release would be stranded: re-check before leaving
            if self.pending.lock().is_none() {
                return;
            }
        }
    }

    async fn process(&self, target: QuotePair) {
        let paused = self.is_paused();
        let (bid_status, ask_status) = self.validator.validate(&target, paused);
        self.publish_status(bid_status, ask_status);

        let bid_work = async {
            match (bid_status, target.bid) {
                (QuoteStatus::Live, Some(quote)) => self.bid.update_quote(quote).await,
                _ => self.bid.cancel_quote().await,
            }
        };
        let ask_work = async {
            match (ask_status, target.ask) {
                (QuoteStatus::Live, Some(quote)) => self.ask.update_quote(quote).await,
                _ => self.ask.cancel_quote().await,
            }
        };

        let (bid_result, ask_result): (
            Result<(), QuotingError>,
            Result<(), QuotingError>,
        ) = tokio::join!(bid_work, ask_work);

        for (side, result) in [(Side::Buy, bid_result), (Side::Sell, ask_result)] {
            if let Err(error) = result {
                warn!(
                    instrument = %self.instrument_id,
                    %side,
                    %error,
                    "quoter dispatch failed"
                );
            }
        }
    }

    fn publish_status(&self, bid_status: QuoteStatus, ask_status: QuoteStatus) {
        let mut last = self.last_status.lock();
        if *last == Some((bid_status, ask_status)) {
            return;
        }
        let previous = last.replace((bid_status, ask_status));
        drop(last);

        if previous.map(|(bid, _)| bid) != Some(bid_status) {
            self.events.status_changed.publish(&QuoteStatusChanged {
                instrument_id: self.instrument_id,
                side: Side::Buy,
                status: bid_status,
            });
        }
        if previous.map(|(_, ask)| ask) != Some(ask_status) {
            self.events.status_changed.publish(&QuoteStatusChanged {
                instrument_id: self.instrument_id,
                side: Side::Sell,
                status: ask_status,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::Quote;
    use arara_data::order::OrderStatusReport;
    use arara_markets::{
        Currency, ExchangeId, Instrument, Price, ProductType, Quantity,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use smol_str::SmolStr;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn instrument() -> Instrument {
        Instrument {
            id: InstrumentId(1),
            symbol: SmolStr::new("BTCUSDT"),
            product: ProductType::Spot,
            exchange: ExchangeId::Binance,
            base: Currency::new("BTC"),
            quote: Currency::new("USDT"),
            tick_size: Price::from_raw(100),
            min_order_size: Quantity::from_raw(1),
        }
    }

    /// Records calls; optionally blocks the first `update_quote` until
    /// released, to hold the processing token mid-iteration.
    struct RecordingQuoter {
        side: Side,
        calls: PlMutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingQuoter {
        fn new(side: Side, gate: Option<Arc<Notify>>) -> Arc<Self> {
            Arc::new(Self {
                side,
                calls: PlMutex::new(Vec::new()),
                gate,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SideQuoter for RecordingQuoter {
        fn side(&self) -> Side {
            self.side
        }

        async fn update_quote(&self, quote: Quote) -> Result<(), QuotingError> {
            let first_call = {
                let mut calls = self.calls.lock();
                calls.push(format!("update:{}", quote.price.raw()));
                calls.len() == 1
            };
            if first_call {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
            }
            Ok(())
        }

        async fn cancel_quote(&self) -> Result<(), QuotingError> {
            self.calls.lock().push("cancel".into());
            Ok(())
        }

        async fn cancel_all(&self) -> Result<(), QuotingError> {
            self.calls.lock().push("cancel_all".into());
            Ok(())
        }

        async fn on_order_status(&self, _report: OrderStatusReport) {}
    }

    fn target(price: i64) -> QuotePair {
        QuotePair {
            instrument_id: InstrumentId(1),
            bid: Some(Quote::new(Price::from_raw(price), Quantity::from_raw(100))),
            ask: Some(Quote::new(
                Price::from_raw(price + 10),
                Quantity::from_raw(100),
            )),
            creation_timestamp: 0,
            is_post_only: false,
        }
    }

    #[tokio::test]
    async fn test_coalescing_keeps_only_latest_target() {
        let gate = Arc::new(Notify::new());
        let bid = RecordingQuoter::new(Side::Buy, Some(Arc::clone(&gate)));
        let ask = RecordingQuoter::new(Side::Sell, None);
        let maker = MarketMaker::new(
            InstrumentId(1),
            Arc::clone(&bid) as Arc<dyn SideQuoter>,
            Arc::clone(&ask) as Arc<dyn SideQuoter>,
            QuoteValidator::new(instrument()),
            QuotingEvents::new(),
        );

        // t0 becomes the processor and blocks inside the bid quoter
        let processor = {
            let maker = Arc::clone(&maker);
            tokio::spawn(async move { maker.update_quote_target(target(1_000)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // t1..t3 only overwrite the pending slot
        maker.update_quote_target(target(2_000)).await;
        maker.update_quote_target(target(3_000)).await;
        maker.update_quote_target(target(4_000)).await;

        gate.notify_one();
        tokio::time::timeout(Duration::from_secs(1), processor)
            .await
            .unwrap()
            .unwrap();

        // t0 processed, then only the latest pending target (t3)
        assert_eq!(bid.calls(), vec!["update:1000", "update:4000"]);
        assert_eq!(ask.calls(), vec!["update:1010", "update:4010"]);
    }

    #[tokio::test]
    async fn test_held_side_is_cancelled() {
        let bid = RecordingQuoter::new(Side::Buy, None);
        let ask = RecordingQuoter::new(Side::Sell, None);
        let maker = MarketMaker::new(
            InstrumentId(1),
            Arc::clone(&bid) as Arc<dyn SideQuoter>,
            Arc::clone(&ask) as Arc<dyn SideQuoter>,
            QuoteValidator::new(instrument()),
            QuotingEvents::new(),
        );

        let mut one_sided = target(1_000);
        one_sided.ask = None;
        maker.update_quote_target(one_sided).await;

        assert_eq!(bid.calls(), vec!["update:1000"]);
        assert_eq!(ask.calls(), vec!["cancel"]);
    }

    #[tokio::test]
    async fn test_pause_cancels_both_sides_and_holds_targets() {
        let bid = RecordingQuoter::new(Side::Buy, None);
        let ask = RecordingQuoter::new(Side::Sell, None);
        let events = QuotingEvents::new();
        let maker = MarketMaker::new(
            InstrumentId(1),
            Arc::clone(&bid) as Arc<dyn SideQuoter>,
            Arc::clone(&ask) as Arc<dyn SideQuoter>,
            QuoteValidator::new(instrument()),
            Arc::clone(&events),
        );

        maker.set_paused(true).await;
        assert_eq!(bid.calls(), vec!["cancel"]);

        maker.update_quote_target(target(1_000)).await;
        // Target processed as held: another cancel, no update
        assert_eq!(bid.calls(), vec!["cancel", "cancel"]);
        assert_eq!(ask.calls(), vec!["cancel", "cancel"]);
    }

    #[tokio::test]
    async fn test_status_transitions_published_on_change_only() {
        let bid = RecordingQuoter::new(Side::Buy, None);
        let ask = RecordingQuoter::new(Side::Sell, None);
        let events = QuotingEvents::new();
        let maker = MarketMaker::new(
            InstrumentId(1),
            bid as Arc<dyn SideQuoter>,
            ask as Arc<dyn SideQuoter>,
            QuoteValidator::new(instrument()),
            Arc::clone(&events),
        );

        let transitions = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&transitions);
        events
            .status_changed
            .subscribe(move |event: &QuoteStatusChanged| {
                sink.lock().push((event.side, event.status));
            });

        maker.update_quote_target(target(1_000)).await;
        maker.update_quote_target(target(2_000)).await;

        let mut one_sided = target(3_000);
        one_sided.ask = None;
        maker.update_quote_target(one_sided).await;

        let transitions = transitions.lock();
        assert_eq!(
            *transitions,
            vec![
                (Side::Buy, QuoteStatus::Live),
                (Side::Sell, QuoteStatus::Live),
                (Side::Sell, QuoteStatus::Held),
            ]
        );
    }
}
