//! Layered quoter: up to `depth` orders per side inside a grouping band.
//!
//! Reconciliation issues at most one gateway action per call to respect
//! venue rate limits; repeated target updates converge the live group onto
//! the layer prices.

use crate::book::BestBookTracker;
use crate::config::QuotingParameters;
use crate::error::QuotingError;
use crate::events::{OrderFullyFilled, QuotingEvents};
use crate::quote::Quote;
use crate::quoter::hitting::apply_hitting_logic;
use crate::quoter::{LiveOrder, LiveOrderState, SideQuoter};
use arara_data::order::{ClientOrderId, OrderStatus, OrderStatusReport};
use arara_execution::order::{NewOrder, OrderKind};
use arara_execution::{OrderBuilder, OrderGateway};
use arara_markets::{Instrument, Price, Side};
use async_trait::async_trait;
use itertools::Itertools;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;

#[derive(Debug, Default)]
struct LayeredState {
    orders: Vec<LiveOrder>,
}

impl LayeredState {
    /// Live cancellable orders sorted inside-out (closest to market first).
    fn sorted_inside_out(&self, side: Side) -> Vec<LiveOrder> {
        let mut live = self
            .orders
            .iter()
            .filter(|order| order.is_cancellable())
            .copied()
            .collect::<Vec<_>>();
        match side {
            Side::Buy => live.sort_by(|a, b| b.price.cmp(&a.price)),
            Side::Sell => live.sort_by(|a, b| a.price.cmp(&b.price)),
        }
        live
    }

    fn find_mut(&mut self, client_order_id: ClientOrderId) -> Option<&mut LiveOrder> {
        self.orders
            .iter_mut()
            .find(|order| order.client_order_id == client_order_id)
    }

    fn remove(&mut self, client_order_id: ClientOrderId) {
        self.orders
            .retain(|order| order.client_order_id != client_order_id);
    }
}

/// Maintains a layered group of orders within the grouping band.
pub struct LayeredQuoter {
    instrument: Instrument,
    side: Side,
    depth: usize,
    gateway: Arc<dyn OrderGateway>,
    builder: Arc<OrderBuilder>,
    best_book: Arc<BestBookTracker>,
    params: Arc<RwLock<QuotingParameters>>,
    events: Arc<QuotingEvents>,
    state: Mutex<LayeredState>,
    /// Serializes overlapping update calls for this group.
    group: Semaphore,
}

impl fmt::Debug for LayeredQuoter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredQuoter")
            .field("instrument", &self.instrument.id)
            .field("side", &self.side)
            .field("depth", &self.depth)
            .finish()
    }
}

impl LayeredQuoter {
    pub fn new(
        instrument: Instrument,
        side: Side,
        depth: usize,
        gateway: Arc<dyn OrderGateway>,
        builder: Arc<OrderBuilder>,
        best_book: Arc<BestBookTracker>,
        params: Arc<RwLock<QuotingParameters>>,
        events: Arc<QuotingEvents>,
    ) -> Arc<Self> {
        Arc::new(Self {
            instrument,
            side,
            depth: depth.max(1),
            gateway,
            builder,
            best_book,
            params,
            events,
            state: Mutex::new(LayeredState::default()),
            group: Semaphore::new(1),
        })
    }

    /// Layer prices laid out from the inside (closest to market) outward,
    /// hitting logic applied per layer, duplicates collapsed.
    fn layer_prices(&self, quote: &Quote) -> Vec<Price> {
        let params = self.params.read();
        let tick = self.instrument.tick_size;
        let depth = self.depth as i64;

        let grouped_step = ((params.grouping_bp * 1e-4 * quote.price.raw() as f64
            / depth as f64
            / tick.raw() as f64)
            .round() as i64)
            .saturating_mul(tick.raw());
        let step = grouped_step.max(tick.raw());

        let best = self.best_book.best(self.instrument.id);
        let hitting_logic = params.hitting_logic;
        drop(params);

        let mut prices = (0..depth)
            .map(|layer| {
                let raw = match self.side {
                    Side::Buy => quote.price.raw() - layer * step,
                    Side::Sell => quote.price.raw() + layer * step,
                };
                apply_hitting_logic(hitting_logic, self.side, Price::from_raw(raw), best, tick)
            })
            .collect::<Vec<_>>();

        // Hitting adjustments may collide layers: collapse and re-sort
        // inside-out
        match self.side {
            Side::Buy => prices.sort_by(|a, b| b.cmp(a)),
            Side::Sell => prices.sort(),
        }
        prices.into_iter().dedup().collect()
    }

    fn order_kind(&self) -> OrderKind {
        if self.params.read().post_only {
            OrderKind::LimitPostOnly
        } else {
            OrderKind::Limit
        }
    }

    async fn cancel_one(
        &self,
        state: &mut LayeredState,
        client_order_id: ClientOrderId,
    ) -> Result<(), QuotingError> {
        if let Some(order) = state.find_mut(client_order_id) {
            order.state = LiveOrderState::CancelRequested;
        }

        match self.gateway.cancel(client_order_id).await {
            Ok(report) => {
                self.apply_report_locked(state, &report);
                Ok(())
            }
            Err(error) => {
                if let Some(order) = state.find_mut(client_order_id) {
                    order.state = LiveOrderState::Working;
                }
                Err(error.into())
            }
        }
    }

    async fn submit_one(
        &self,
        state: &mut LayeredState,
        price: Price,
        size: arara_markets::Quantity,
    ) -> Result<(), QuotingError> {
        let order = NewOrder {
            client_order_id: self.builder.next_client_order_id(),
            instrument_id: self.instrument.id,
            side: self.side,
            price,
            quantity: size,
            kind: self.order_kind(),
        };
        state.orders.push(LiveOrder::new(order.client_order_id, price, size));

        match self.gateway.submit(order).await {
            Ok(report) => {
                self.apply_report_locked(state, &report);
                Ok(())
            }
            Err(error) => {
                state.remove(order.client_order_id);
                Err(error.into())
            }
        }
    }

    /// One reconciliation step; at most one gateway action.
    async fn reconcile(&self, quote: Quote) -> Result<(), QuotingError> {
        let targets = self.layer_prices(&quote);
        let mut state = self.state.lock().await;
        let live = state.sorted_inside_out(self.side);

        // 1. Excess live orders: take the innermost off first
        if live.len() > targets.len() {
            let innermost = live[0].client_order_id;
            return self.cancel_one(&mut state, innermost).await;
        }

        // 2./3. Walk outer -> inner: fix the first price mismatch, or
        // place the first missing layer
        let shift = targets.len() - live.len();
        for index in (0..targets.len()).rev() {
            if index >= shift {
                let matched = &live[index - shift];
                if matched.price == targets[index] {
                    continue;
                }
                return if self.gateway.supports_replace() {
                    let report = self
                        .gateway
                        .replace(matched.client_order_id, targets[index], self.order_kind())
                        .await
                        .map_err(QuotingError::from)?;
                    if let Some(order) = state.find_mut(matched.client_order_id) {
                        order.price = targets[index];
                    }
                    self.apply_report_locked(&mut state, &report);
                    Ok(())
                } else {
                    // Re-creation happens on a later call once the cancel
                    // frees the layer
                    self.cancel_one(&mut state, matched.client_order_id).await
                };
            }

            return self.submit_one(&mut state, targets[index], quote.size).await;
        }

        Ok(())
    }

    fn apply_report_locked(&self, state: &mut LayeredState, report: &OrderStatusReport) {
        let Some(order) = state.find_mut(report.client_order_id) else {
            return;
        };
        order.filled = report.cumulative_filled();

        if !report.status.is_terminal() {
            if order.state != LiveOrderState::CancelRequested {
                order.state = LiveOrderState::Working;
            }
            return;
        }

        let client_order_id = order.client_order_id;
        state.remove(client_order_id);

        if report.status == OrderStatus::Filled {
            self.events.order_fully_filled.publish(&OrderFullyFilled {
                instrument_id: self.instrument.id,
                side: self.side,
                client_order_id,
            });
        }
    }

    /// Snapshot, mark, and bulk-cancel every cancellable live order.
    async fn bulk_cancel(&self) -> Result<(), QuotingError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let ids = state
                .orders
                .iter()
                .filter(|order| order.is_cancellable())
                .map(|order| order.client_order_id)
                .collect::<Vec<_>>();
            for &id in &ids {
                if let Some(order) = state.find_mut(id) {
                    order.state = LiveOrderState::CancelRequested;
                }
            }
            ids
        };

        if snapshot.is_empty() {
            return Ok(());
        }

        let responses = self.gateway.bulk_cancel(snapshot).await;

        let mut state = self.state.lock().await;
        for (client_order_id, response) in responses {
            match response {
                Ok(report) => self.apply_report_locked(&mut state, &report),
                Err(error) => {
                    warn!(
                        instrument = %self.instrument,
                        side = %self.side,
                        %client_order_id,
                        %error,
                        "bulk cancel leg failed, reverting pending state"
                    );
                    if let Some(order) = state.find_mut(client_order_id) {
                        order.state = LiveOrderState::Working;
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SideQuoter for LayeredQuoter {
    fn side(&self) -> Side {
        self.side
    }

    async fn update_quote(&self, quote: Quote) -> Result<(), QuotingError> {
        let _permit = self
            .group
            .acquire()
            .await
            .map_err(|_| QuotingError::InvalidQuote("quoter group closed".into()))?;
        self.reconcile(quote).await
    }

    async fn cancel_quote(&self) -> Result<(), QuotingError> {
        let _permit = self
            .group
            .acquire()
            .await
            .map_err(|_| QuotingError::InvalidQuote("quoter group closed".into()))?;
        self.bulk_cancel().await
    }

    async fn cancel_all(&self) -> Result<(), QuotingError> {
        self.cancel_quote().await
    }

    async fn on_order_status(&self, report: OrderStatusReport) {
        let mut state = self.state.lock().await;
        self.apply_report_locked(&mut state, &report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arara_execution::ExecutionError;
    use arara_markets::{Currency, ExchangeId, InstrumentId, ProductType, Quantity};
    use parking_lot::Mutex as PlMutex;
    use smol_str::SmolStr;

    fn instrument() -> Instrument {
        Instrument {
            id: InstrumentId(1),
            symbol: SmolStr::new("BTCUSDT"),
            product: ProductType::PerpetualFuture,
            exchange: ExchangeId::Binance,
            base: Currency::new("BTC"),
            quote: Currency::new("USDT"),
            // tick = 0.01
            tick_size: Price::from_raw(1_000_000),
            min_order_size: Quantity::from_raw(1_000),
        }
    }

    struct MockGateway {
        actions: PlMutex<Vec<String>>,
    }

    impl MockGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                actions: PlMutex::new(Vec::new()),
            })
        }

        fn actions(&self) -> Vec<String> {
            self.actions.lock().clone()
        }

        fn report(
            client_order_id: ClientOrderId,
            status: OrderStatus,
            price: Price,
        ) -> OrderStatusReport {
            OrderStatusReport {
                client_order_id,
                exchange_order_id: None,
                execution_id: None,
                instrument_id: InstrumentId(1),
                side: Side::Buy,
                status,
                price,
                quantity: Quantity::from_raw(10_000),
                last_price: Price::ZERO,
                last_quantity: Quantity::ZERO,
                leaves_quantity: Quantity::from_raw(10_000),
                timestamp: 1,
            }
        }
    }

    #[async_trait]
    impl OrderGateway for MockGateway {
        async fn submit(&self, order: NewOrder) -> Result<OrderStatusReport, ExecutionError> {
            self.actions.lock().push(format!("submit:{}", order.price.raw()));
            Ok(Self::report(order.client_order_id, OrderStatus::New, order.price))
        }

        async fn replace(
            &self,
            client_order_id: ClientOrderId,
            new_price: Price,
            _kind: OrderKind,
        ) -> Result<OrderStatusReport, ExecutionError> {
            self.actions.lock().push(format!("replace:{}", new_price.raw()));
            Ok(Self::report(client_order_id, OrderStatus::New, new_price))
        }

        async fn cancel(
            &self,
            client_order_id: ClientOrderId,
        ) -> Result<OrderStatusReport, ExecutionError> {
            self.actions.lock().push("cancel".into());
            Ok(Self::report(
                client_order_id,
                OrderStatus::Cancelled,
                Price::ZERO,
            ))
        }

        async fn bulk_cancel(
            &self,
            client_order_ids: Vec<ClientOrderId>,
        ) -> Vec<(ClientOrderId, Result<OrderStatusReport, ExecutionError>)> {
            self.actions
                .lock()
                .push(format!("bulk_cancel:{}", client_order_ids.len()));
            client_order_ids
                .into_iter()
                .map(|id| (id, Ok(Self::report(id, OrderStatus::Cancelled, Price::ZERO))))
                .collect()
        }
    }

    struct Harness {
        quoter: Arc<LayeredQuoter>,
        gateway: Arc<MockGateway>,
    }

    fn harness(depth: usize, grouping_bp: f64) -> Harness {
        let gateway = MockGateway::new();
        let quoter = LayeredQuoter::new(
            instrument(),
            Side::Buy,
            depth,
            Arc::clone(&gateway) as Arc<dyn OrderGateway>,
            Arc::new(OrderBuilder::new(false)),
            BestBookTracker::new(),
            Arc::new(RwLock::new(QuotingParameters {
                grouping_bp,
                ..QuotingParameters::default()
            })),
            QuotingEvents::new(),
        );
        Harness { quoter, gateway }
    }

    fn quote(price: i64) -> Quote {
        Quote::new(Price::from_raw(price), Quantity::from_raw(10_000))
    }

    #[test]
    fn test_layer_prices_inside_out_with_minimum_step() {
        // grouping 0 -> step falls back to one tick
        let harness = harness(3, 0.0);
        let prices = harness.quoter.layer_prices(&quote(10_000_000_000));
        assert_eq!(
            prices,
            vec![
                Price::from_raw(10_000_000_000),
                Price::from_raw(9_999_000_000),
                Price::from_raw(9_998_000_000),
            ]
        );
    }

    #[test]
    fn test_layer_step_from_grouping() {
        // 10bp of 100.00 = 0.10, split over depth 2 -> 0.05 = 5 ticks
        let harness = harness(2, 10.0);
        let prices = harness.quoter.layer_prices(&quote(10_000_000_000));
        assert_eq!(
            prices,
            vec![Price::from_raw(10_000_000_000), Price::from_raw(9_995_000_000)]
        );
    }

    #[tokio::test]
    async fn test_reconciliation_builds_group_one_action_per_call() {
        let harness = harness(3, 0.0);

        // Outer layers submit first, one per call
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        // Converged: the fourth call issues nothing
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();

        assert_eq!(
            harness.gateway.actions(),
            vec![
                "submit:9998000000",
                "submit:9999000000",
                "submit:10000000000",
            ]
        );
    }

    #[tokio::test]
    async fn test_price_move_replaces_outer_first() {
        let harness = harness(2, 0.0);
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        assert_eq!(harness.gateway.actions().len(), 2);

        // Shift the whole group one tick up: two replaces, outer first
        harness.quoter.update_quote(quote(10_001_000_000)).await.unwrap();
        harness.quoter.update_quote(quote(10_001_000_000)).await.unwrap();
        harness.quoter.update_quote(quote(10_001_000_000)).await.unwrap();

        assert_eq!(
            harness.gateway.actions()[2..],
            [
                "replace:10000000000".to_string(),
                "replace:10001000000".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_excess_live_orders_cancel_innermost() {
        let harness = harness(3, 0.0);
        for _ in 0..3 {
            harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        }

        // Depth shrinks to 1 via duplicate-collapsing: clamp everything to
        // one price by forcing hitting to our best
        {
            let mut params = harness.quoter.params.write();
            params.hitting_logic = crate::config::HittingLogic::OurBest;
        }
        harness.quoter.best_book.set(
            InstrumentId(1),
            crate::book::BestBook {
                bid: Some(Price::from_raw(9_990_000_000)),
                ask: Some(Price::from_raw(9_991_000_000)),
            },
        );

        // All three layers collapse onto 9_990_000_000: live 3 > targets 1
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        assert_eq!(harness.gateway.actions().last().unwrap(), "cancel");
    }

    #[tokio::test]
    async fn test_bulk_cancel_snapshot_and_routing() {
        let harness = harness(3, 0.0);
        for _ in 0..3 {
            harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();
        }

        harness.quoter.cancel_all().await.unwrap();
        assert_eq!(harness.gateway.actions().last().unwrap(), "bulk_cancel:3");

        // Terminal reports cleared every slot
        assert!(harness.quoter.state.lock().await.orders.is_empty());
    }

    #[tokio::test]
    async fn test_full_fill_removes_layer_and_fires_event() {
        let harness = harness(2, 0.0);
        harness.quoter.update_quote(quote(10_000_000_000)).await.unwrap();

        let filled = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&filled);
        harness
            .quoter
            .events
            .order_fully_filled
            .subscribe(move |event: &OrderFullyFilled| {
                sink.lock().push(*event);
            });

        let id = harness.quoter.state.lock().await.orders[0].client_order_id;
        harness
            .quoter
            .on_order_status(MockGateway::report(id, OrderStatus::Filled, Price::ZERO))
            .await;

        assert_eq!(filled.lock().len(), 1);
        assert!(harness.quoter.state.lock().await.orders.is_empty());
    }
}
