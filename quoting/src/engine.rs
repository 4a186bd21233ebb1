//! The quoting engine: fair value in, quote targets out.

use crate::config::QuotingParameters;
use crate::events::{OrderFullyFilled, QuotingEvents};
use crate::fair_value::FairValueProvider;
use crate::maker::MarketMaker;
use crate::quote::{Quote, QuotePair};
use arara_data::event::FairValueUpdate;
use arara_data::order::Fill;
use arara_integration::event::HubSubscription;
use arara_integration::time::now_epoch_ms;
use arara_markets::{Instrument, Price, Side};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct GroupCache {
    grouping_bp: f64,
    group_ticks: i64,
}

/// Consumes [`FairValueUpdate`]s and [`Fill`]s; emits [`QuotePair`] targets
/// into the [`MarketMaker`].
///
/// Runs no dedicated task: everything happens on provider callbacks, with
/// maker dispatch handed to a spawned task so callbacks never block.
pub struct QuotingEngine {
    instrument: Instrument,
    provider: Arc<dyn FairValueProvider>,
    maker: Arc<MarketMaker>,
    params: Arc<RwLock<QuotingParameters>>,
    events: Arc<QuotingEvents>,
    /// Net one-sided fills not yet folded into the spreads, raw quantity
    /// units. Each nets against the opposite counter first.
    unapplied_buy: AtomicI64,
    unapplied_sell: AtomicI64,
    /// Absolute fill totals for the inventory caps; never decremented.
    total_buy: AtomicI64,
    total_sell: AtomicI64,
    paused_until: Mutex<Option<Instant>>,
    active: AtomicBool,
    provider_subscription: Mutex<Option<HubSubscription>>,
    group_cache: Mutex<Option<GroupCache>>,
    full_fill_subscription: Mutex<Option<HubSubscription>>,
}

impl fmt::Debug for QuotingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotingEngine")
            .field("instrument", &self.instrument.id)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl QuotingEngine {
    pub fn new(
        instrument: Instrument,
        provider: Arc<dyn FairValueProvider>,
        maker: Arc<MarketMaker>,
        params: Arc<RwLock<QuotingParameters>>,
        events: Arc<QuotingEvents>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            instrument,
            provider,
            maker,
            params,
            events: Arc::clone(&events),
            unapplied_buy: AtomicI64::new(0),
            unapplied_sell: AtomicI64::new(0),
            total_buy: AtomicI64::new(0),
            total_sell: AtomicI64::new(0),
            paused_until: Mutex::new(None),
            active: AtomicBool::new(false),
            provider_subscription: Mutex::new(None),
            group_cache: Mutex::new(None),
            full_fill_subscription: Mutex::new(None),
        });

        // Pause-on-full-fill: reported by the maker's quoters
        let weak = Arc::downgrade(&engine);
        let subscription = events
            .order_fully_filled
            .subscribe(move |event: &OrderFullyFilled| {
                if let Some(engine) = weak.upgrade() {
                    engine.on_order_fully_filled(event);
                }
            });
        *engine.full_fill_subscription.lock() = Some(subscription);

        engine
    }

    pub fn events(&self) -> &Arc<QuotingEvents> {
        &self.events
    }

    /// Subscribe to the fair value provider.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.provider_subscription.lock();
        if slot.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = self
            .provider
            .fair_values()
            .subscribe(move |update: &FairValueUpdate| {
                if let Some(engine) = weak.upgrade() {
                    engine.on_fair_value(update);
                }
            });
        *slot = Some(subscription);
        debug!(instrument = %self.instrument, source = ?self.provider.source(), "quoting engine started");
    }

    /// Unsubscribe from the fair value provider.
    pub fn stop(&self) {
        if let Some(subscription) = self.provider_subscription.lock().take() {
            self.provider.fair_values().unsubscribe(subscription);
        }
    }

    /// Toggle whether computed targets are dispatched to the maker.
    /// Observers on the quote hub always see the computed pairs.
    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused_until
            .lock()
            .is_some_and(|until| Instant::now() < until)
    }

    fn on_order_fully_filled(&self, event: &OrderFullyFilled) {
        if event.instrument_id != self.instrument.id {
            return;
        }
        let cooldown = Duration::from_millis(self.params.read().cooldown_on_fill_ms);
        *self.paused_until.lock() = Some(Instant::now() + cooldown);
        debug!(instrument = %self.instrument, ?cooldown, "full fill, quoting paused");
    }

    /// Record a fill: net against the opposite unapplied counter first,
    /// remainder accrues on the same side. Totals only ever grow.
    pub fn on_fill(&self, fill: &Fill) {
        if fill.instrument_id != self.instrument.id {
            return;
        }

        let amount = fill.quantity.raw();
        match fill.side {
            Side::Buy => {
                let leftover = net_against(&self.unapplied_sell, amount);
                if leftover > 0 {
                    self.unapplied_buy.fetch_add(leftover, Ordering::AcqRel);
                }
                self.total_buy.fetch_add(amount, Ordering::AcqRel);
            }
            Side::Sell => {
                let leftover = net_against(&self.unapplied_buy, amount);
                if leftover > 0 {
                    self.unapplied_sell.fetch_add(leftover, Ordering::AcqRel);
                }
                self.total_sell.fetch_add(amount, Ordering::AcqRel);
            }
        }
    }

    /// Fold whole order-sizes of unapplied fills into the spreads.
    fn apply_skew(&self) {
        let (order_size, skew_bp) = {
            let params = self.params.read();
            (params.order_size.raw(), params.skew_bp)
        };
        if order_size <= 0 || skew_bp == 0.0 {
            return;
        }

        let buy_multiples = self.unapplied_buy.load(Ordering::Acquire) / order_size;
        if buy_multiples >= 1 {
            self.unapplied_buy
                .fetch_sub(buy_multiples * order_size, Ordering::AcqRel);
            self.adjust_spreads(-(buy_multiples as f64) * skew_bp);
        }

        let sell_multiples = self.unapplied_sell.load(Ordering::Acquire) / order_size;
        if sell_multiples >= 1 {
            self.unapplied_sell
                .fetch_sub(sell_multiples * order_size, Ordering::AcqRel);
            self.adjust_spreads(sell_multiples as f64 * skew_bp);
        }
    }

    fn adjust_spreads(&self, delta_bp: f64) {
        let snapshot = {
            let mut params = self.params.write();
            params.bid_spread_bp += delta_bp;
            params.ask_spread_bp += delta_bp;
            params.clone()
        };
        self.events.parameters_updated.publish(&snapshot);
    }

    /// Per-instrument grouping bucket in ticks, cached until `grouping_bp`
    /// changes. The reference price is captured at computation time.
    fn group_ticks(&self, grouping_bp: f64, reference: Price) -> i64 {
        let mut cache = self.group_cache.lock();
        if let Some(cached) = *cache {
            if cached.grouping_bp == grouping_bp {
                return cached.group_ticks;
            }
        }

        let tick = self.instrument.tick_size.raw();
        let group_ticks = ((reference.raw() as f64 * grouping_bp * 1e-4 / tick as f64).round()
            as i64)
            .max(1);
        *cache = Some(GroupCache {
            grouping_bp,
            group_ticks,
        });
        group_ticks
    }

    /// Requote on one fair value update.
    pub fn on_fair_value(&self, update: &FairValueUpdate) {
        if update.instrument_id != self.instrument.id {
            return;
        }
        // 1. A half-formed signal is skipped outright
        if update.fair_bid.is_zero() || update.fair_ask.is_zero() {
            return;
        }

        self.apply_skew();

        let params = self.params.read().clone();
        let tick = self.instrument.tick_size;

        // 2./3. Spread application and tick rounding (bid down, ask up)
        let mut bid_price = update
            .fair_bid
            .apply_basis_points(params.bid_spread_bp)
            .floor_to_tick(tick);
        let mut ask_price = update
            .fair_ask
            .apply_basis_points(params.ask_spread_bp)
            .ceil_to_tick(tick);

        // 5. Grouping coarsens both sides outward
        if params.grouping_bp > 0.0 {
            let group = Price::from_raw(
                self.group_ticks(params.grouping_bp, update.fair_bid) * tick.raw(),
            );
            bid_price = bid_price.floor_to_tick(group);
            ask_price = ask_price.ceil_to_tick(group);
        }

        // 4. Inventory caps drop a side entirely
        let bid_cap = params.max_cum_bid_fills.raw();
        let bid = (bid_cap <= 0 || self.total_buy.load(Ordering::Acquire) < bid_cap)
            .then_some(Quote::new(bid_price, params.order_size));
        let ask_cap = params.max_cum_ask_fills.raw();
        let ask = (ask_cap <= 0 || self.total_sell.load(Ordering::Acquire) < ask_cap)
            .then_some(Quote::new(ask_price, params.order_size));

        let pair = QuotePair {
            instrument_id: self.instrument.id,
            bid,
            ask,
            creation_timestamp: now_epoch_ms(),
            is_post_only: params.post_only,
        };

        // 6. Observers always see the computed pair
        self.events.quote_pairs.publish(&pair);

        // Dispatch is gated by activation and the post-fill cooldown
        if self.is_active() && !self.is_paused() {
            let maker = Arc::clone(&self.maker);
            tokio::spawn(async move {
                maker.update_quote_target(pair).await;
            });
        }
    }
}

impl Drop for QuotingEngine {
    fn drop(&mut self) {
        self.stop();
        if let Some(subscription) = self.full_fill_subscription.lock().take() {
            self.events.order_fully_filled.unsubscribe(subscription);
        }
    }
}

/// Take as much of `amount` as the counter holds, CAS-looped; returns the
/// remainder that could not be netted.
fn net_against(counter: &AtomicI64, amount: i64) -> i64 {
    loop {
        let current = counter.load(Ordering::Acquire);
        if current <= 0 {
            return amount;
        }
        let take = current.min(amount);
        if counter
            .compare_exchange(current, current - take, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return amount - take;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuotingError;
    use crate::quoter::SideQuoter;
    use crate::validator::QuoteValidator;
    use arara_data::order::{ClientOrderId, OrderStatusReport};
    use arara_integration::event::EventHub;
    use arara_markets::{
        Currency, ExchangeId, InstrumentId, ProductType, Quantity,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use smol_str::SmolStr;
    use std::time::Duration;

    fn instrument() -> Instrument {
        Instrument {
            id: InstrumentId(1),
            symbol: SmolStr::new("BTCUSDT"),
            product: ProductType::Spot,
            exchange: ExchangeId::Binance,
            base: Currency::new("BTC"),
            quote: Currency::new("USDT"),
            // tick = 0.01
            tick_size: Price::from_raw(1_000_000),
            min_order_size: Quantity::from_raw(1),
        }
    }

    struct StaticProvider {
        hub: EventHub<FairValueUpdate>,
    }

    impl FairValueProvider for StaticProvider {
        fn source(&self) -> crate::fair_value::FairValueSource {
            crate::fair_value::FairValueSource::BestBook
        }

        fn fair_values(&self) -> &EventHub<FairValueUpdate> {
            &self.hub
        }
    }

    struct NullQuoter {
        side: Side,
        updates: PlMutex<Vec<Quote>>,
    }

    impl NullQuoter {
        fn new(side: Side) -> Arc<Self> {
            Arc::new(Self {
                side,
                updates: PlMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SideQuoter for NullQuoter {
        fn side(&self) -> Side {
            self.side
        }

        async fn update_quote(&self, quote: Quote) -> Result<(), QuotingError> {
            self.updates.lock().push(quote);
            Ok(())
        }

        async fn cancel_quote(&self) -> Result<(), QuotingError> {
            Ok(())
        }

        async fn cancel_all(&self) -> Result<(), QuotingError> {
            Ok(())
        }

        async fn on_order_status(&self, _report: OrderStatusReport) {}
    }

    struct Harness {
        engine: Arc<QuotingEngine>,
        provider: Arc<StaticProvider>,
        events: Arc<QuotingEvents>,
        pairs: Arc<PlMutex<Vec<QuotePair>>>,
        bid: Arc<NullQuoter>,
    }

    fn harness(params: QuotingParameters) -> Harness {
        let provider = Arc::new(StaticProvider {
            hub: EventHub::new(),
        });
        let events = QuotingEvents::new();
        let params = Arc::new(RwLock::new(params));
        let bid = NullQuoter::new(Side::Buy);
        let ask = NullQuoter::new(Side::Sell);
        let maker = MarketMaker::new(
            InstrumentId(1),
            Arc::clone(&bid) as Arc<dyn SideQuoter>,
            ask as Arc<dyn SideQuoter>,
            QuoteValidator::new(instrument()),
            Arc::clone(&events),
        );

        let engine = QuotingEngine::new(
            instrument(),
            Arc::clone(&provider) as Arc<dyn FairValueProvider>,
            maker,
            params,
            Arc::clone(&events),
        );

        let pairs = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&pairs);
        events.quote_pairs.subscribe(move |pair: &QuotePair| {
            sink.lock().push(*pair);
        });

        Harness {
            engine,
            provider,
            events,
            pairs,
            bid,
        }
    }

    fn fair_value(bid: i64, ask: i64) -> FairValueUpdate {
        FairValueUpdate {
            instrument_id: InstrumentId(1),
            fair_bid: Price::from_raw(bid),
            fair_ask: Price::from_raw(ask),
        }
    }

    fn base_params() -> QuotingParameters {
        QuotingParameters {
            bid_spread_bp: -10.0,
            ask_spread_bp: 10.0,
            order_size: Quantity::from_raw(100_000),
            skew_bp: 2.0,
            ..QuotingParameters::default()
        }
    }

    fn fill(side: Side, quantity: i64) -> Fill {
        Fill {
            client_order_id: ClientOrderId(1),
            instrument_id: InstrumentId(1),
            side,
            price: Price::from_raw(10_000_000_000),
            quantity: Quantity::from_raw(quantity),
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn test_requote_is_idempotent_without_fills() {
        let harness = harness(base_params());
        let update = fair_value(10_000_000_000, 10_000_000_000);

        harness.engine.on_fair_value(&update);
        harness.engine.on_fair_value(&update);

        let pairs = harness.pairs.lock();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].bid, pairs[1].bid);
        assert_eq!(pairs[0].ask, pairs[1].ask);

        // fair 100.00, -10bp floored / +10bp ceiled at 0.01 ticks
        assert_eq!(pairs[0].bid.unwrap().price, Price::from_raw(9_990_000_000));
        assert_eq!(pairs[0].ask.unwrap().price, Price::from_raw(10_010_000_000));
    }

    #[tokio::test]
    async fn test_zero_fair_value_is_skipped() {
        let harness = harness(base_params());
        harness.engine.on_fair_value(&fair_value(0, 10_000_000_000));
        harness.engine.on_fair_value(&fair_value(10_000_000_000, 0));
        assert!(harness.pairs.lock().is_empty());
    }

    #[tokio::test]
    async fn test_skew_symmetry_restores_spreads() {
        let harness = harness(base_params());
        let original = harness.engine.params.read().clone();
        let update = fair_value(10_000_000_000, 10_000_000_000);

        // One order-size of buys: both spreads shift down on the next cycle
        harness.engine.on_fill(&fill(Side::Buy, 100_000));
        harness.engine.on_fair_value(&update);
        {
            let skewed = harness.engine.params.read();
            assert_eq!(skewed.bid_spread_bp, original.bid_spread_bp - 2.0);
            assert_eq!(skewed.ask_spread_bp, original.ask_spread_bp - 2.0);
        }

        // The symmetric sell restores everything
        harness.engine.on_fill(&fill(Side::Sell, 100_000));
        harness.engine.on_fair_value(&update);
        {
            let restored = harness.engine.params.read();
            assert_eq!(restored.bid_spread_bp, original.bid_spread_bp);
            assert_eq!(restored.ask_spread_bp, original.ask_spread_bp);
        }
    }

    #[tokio::test]
    async fn test_offsetting_fills_without_requote_never_skew() {
        let harness = harness(base_params());
        let original = harness.engine.params.read().clone();

        harness.engine.on_fill(&fill(Side::Buy, 100_000));
        harness.engine.on_fill(&fill(Side::Sell, 100_000));
        harness
            .engine
            .on_fair_value(&fair_value(10_000_000_000, 10_000_000_000));

        let params = harness.engine.params.read();
        assert_eq!(params.bid_spread_bp, original.bid_spread_bp);
        assert_eq!(params.ask_spread_bp, original.ask_spread_bp);
    }

    #[tokio::test]
    async fn test_parameters_updated_event_fires_on_skew() {
        let harness = harness(base_params());
        let updates = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        harness
            .events
            .parameters_updated
            .subscribe(move |params: &QuotingParameters| {
                sink.lock().push(params.clone());
            });

        harness.engine.on_fill(&fill(Side::Buy, 250_000));
        harness
            .engine
            .on_fair_value(&fair_value(10_000_000_000, 10_000_000_000));

        let updates = updates.lock();
        // 250k / 100k order size -> k = 2
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].bid_spread_bp, base_params().bid_spread_bp - 4.0);
    }

    #[tokio::test]
    async fn test_grouping_monotone_never_narrows_spread() {
        let update = fair_value(10_000_000_000, 10_000_000_000);
        let mut previous_spread = None;

        for grouping_bp in [0.0, 5.0, 20.0, 50.0] {
            let harness = harness(QuotingParameters {
                grouping_bp,
                ..base_params()
            });
            harness.engine.on_fair_value(&update);

            let pairs = harness.pairs.lock();
            let spread = pairs[0].spread().unwrap();
            if let Some(previous) = previous_spread {
                assert!(
                    spread >= previous,
                    "grouping {grouping_bp} narrowed spread: {spread} < {previous}"
                );
            }
            previous_spread = Some(spread);
        }
    }

    #[tokio::test]
    async fn test_inventory_cap_drops_side() {
        let harness = harness(QuotingParameters {
            max_cum_bid_fills: Quantity::from_raw(150_000),
            ..base_params()
        });

        harness.engine.on_fill(&fill(Side::Buy, 200_000));
        harness
            .engine
            .on_fair_value(&fair_value(10_000_000_000, 10_000_000_000));

        let pairs = harness.pairs.lock();
        assert!(pairs[0].bid.is_none());
        assert!(pairs[0].ask.is_some());
    }

    #[tokio::test]
    async fn test_totals_survive_netting() {
        // Netted fills still count towards the absolute totals
        let harness = harness(QuotingParameters {
            max_cum_bid_fills: Quantity::from_raw(150_000),
            ..base_params()
        });

        harness.engine.on_fill(&fill(Side::Buy, 100_000));
        harness.engine.on_fill(&fill(Side::Sell, 100_000));
        harness.engine.on_fill(&fill(Side::Buy, 100_000));

        harness
            .engine
            .on_fair_value(&fair_value(10_000_000_000, 10_000_000_000));

        // total_buy = 200k >= 150k cap even though net inventory is 100k
        assert!(harness.pairs.lock()[0].bid.is_none());
    }

    #[tokio::test]
    async fn test_pause_on_full_fill_withholds_dispatch() {
        let harness = harness(QuotingParameters {
            cooldown_on_fill_ms: 60_000,
            ..base_params()
        });
        harness.engine.activate();

        harness.events.order_fully_filled.publish(&OrderFullyFilled {
            instrument_id: InstrumentId(1),
            side: Side::Buy,
            client_order_id: ClientOrderId(7),
        });
        assert!(harness.engine.is_paused());

        harness
            .engine
            .on_fair_value(&fair_value(10_000_000_000, 10_000_000_000));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Observers saw the pair; the maker did not
        assert_eq!(harness.pairs.lock().len(), 1);
        assert!(harness.bid.updates.lock().is_empty());
    }

    #[tokio::test]
    async fn test_activation_gates_dispatch() {
        let harness = harness(base_params());
        let update = fair_value(10_000_000_000, 10_000_000_000);

        harness.engine.on_fair_value(&update);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.bid.updates.lock().is_empty());

        harness.engine.activate();
        harness.engine.on_fair_value(&update);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.bid.updates.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_start_subscribes_to_provider() {
        let harness = harness(base_params());
        harness.engine.start();
        assert_eq!(harness.provider.hub.len(), 1);

        harness
            .provider
            .hub
            .publish(&fair_value(10_000_000_000, 10_000_000_000));
        assert_eq!(harness.pairs.lock().len(), 1);

        harness.engine.stop();
        assert_eq!(harness.provider.hub.len(), 0);
    }
}
