//! Single-order quoter: at most one live order per side.

use crate::book::{BestBook, BestBookTracker};
use crate::config::QuotingParameters;
use crate::error::QuotingError;
use crate::events::{OrderFullyFilled, QuotingEvents};
use crate::position::PositionSource;
use crate::quote::Quote;
use crate::quoter::hitting::apply_hitting_logic;
use crate::quoter::{LiveOrder, LiveOrderState, SideQuoter};
use arara_data::order::{OrderStatus, OrderStatusReport};
use arara_execution::order::{NewOrder, OrderKind};
use arara_execution::{OrderBuilder, OrderGateway};
use arara_markets::{Instrument, Price, ProductType, Side};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Partially filled orders within this band around the mid are still
/// replaced; outside it they are cancelled instead.
const NEAR_MID_BAND_BP: f64 = 3.0;

#[derive(Debug, Default)]
struct SingleState {
    active: Option<LiveOrder>,
    /// Staged quote submitted once the in-flight cancel goes terminal.
    pending_reentry: Option<Quote>,
}

/// Maintains one live order, replacing or cancel-and-re-entering as the
/// target moves.
pub struct SingleOrderQuoter {
    instrument: Instrument,
    side: Side,
    gateway: Arc<dyn OrderGateway>,
    builder: Arc<OrderBuilder>,
    best_book: Arc<BestBookTracker>,
    params: Arc<RwLock<QuotingParameters>>,
    events: Arc<QuotingEvents>,
    position: Option<Arc<dyn PositionSource>>,
    state: Mutex<SingleState>,
}

impl fmt::Debug for SingleOrderQuoter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleOrderQuoter")
            .field("instrument", &self.instrument.id)
            .field("side", &self.side)
            .finish()
    }
}

impl SingleOrderQuoter {
    pub fn new(
        instrument: Instrument,
        side: Side,
        gateway: Arc<dyn OrderGateway>,
        builder: Arc<OrderBuilder>,
        best_book: Arc<BestBookTracker>,
        params: Arc<RwLock<QuotingParameters>>,
        events: Arc<QuotingEvents>,
        position: Option<Arc<dyn PositionSource>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            instrument,
            side,
            gateway,
            builder,
            best_book,
            params,
            events,
            position,
            state: Mutex::new(SingleState::default()),
        })
    }

    fn order_kind(&self) -> OrderKind {
        if self.params.read().post_only {
            OrderKind::LimitPostOnly
        } else {
            OrderKind::Limit
        }
    }

    /// Within ±3bp of the book mid. Unknown mid counts as far.
    fn near_mid(&self, price: Price, best: BestBook) -> bool {
        let (Some(bid), Some(ask)) = (best.bid, best.ask) else {
            return false;
        };
        let mid = (bid.raw() + ask.raw()) / 2;
        let band = ((mid as f64) * NEAR_MID_BAND_BP * 1e-4) as i64;
        (price.raw() - mid).abs() <= band
    }

    async fn submit_locked(
        &self,
        state: &mut SingleState,
        quote: Quote,
    ) -> Result<(), QuotingError> {
        let order = NewOrder {
            client_order_id: self.builder.next_client_order_id(),
            instrument_id: self.instrument.id,
            side: self.side,
            price: quote.price,
            quantity: quote.size,
            kind: self.order_kind(),
        };
        state.active = Some(LiveOrder::new(order.client_order_id, order.price, order.quantity));

        match self.gateway.submit(order).await {
            Ok(report) => {
                // An immediate terminal (eg/ reject) clears the slot; a
                // staged follow-up cannot exist on this path
                let _ = self.apply_report_locked(state, &report);
                Ok(())
            }
            Err(error) => {
                state.active = None;
                Err(error.into())
            }
        }
    }

    async fn cancel_active_locked(&self, state: &mut SingleState) -> Result<(), QuotingError> {
        let Some(active) = state.active.as_mut() else {
            return Ok(());
        };
        if !active.is_cancellable() {
            return Ok(());
        }

        active.state = LiveOrderState::CancelRequested;
        let client_order_id = active.client_order_id;

        match self.gateway.cancel(client_order_id).await {
            Ok(report) => {
                if let Some(staged) = self.apply_report_locked(state, &report) {
                    self.submit_locked(state, staged).await?;
                }
                Ok(())
            }
            Err(error) => {
                if let Some(active) = state.active.as_mut() {
                    active.state = LiveOrderState::Working;
                }
                Err(error.into())
            }
        }
    }

    /// Fold a status report into the state. Returns the staged re-entry
    /// quote when a terminal status released it.
    fn apply_report_locked(
        &self,
        state: &mut SingleState,
        report: &OrderStatusReport,
    ) -> Option<Quote> {
        {
            let active = state.active.as_mut()?;
            if active.client_order_id != report.client_order_id {
                return None;
            }

            active.filled = report.cumulative_filled();

            if !report.status.is_terminal() {
                if active.state != LiveOrderState::CancelRequested {
                    active.state = LiveOrderState::Working;
                }
                return None;
            }
        }

        let finished = state.active.take()?;
        if report.status == OrderStatus::Filled {
            self.events.order_fully_filled.publish(&OrderFullyFilled {
                instrument_id: self.instrument.id,
                side: self.side,
                client_order_id: finished.client_order_id,
            });
        }
        state.pending_reentry.take()
    }
}

#[async_trait]
impl SideQuoter for SingleOrderQuoter {
    fn side(&self) -> Side {
        self.side
    }

    async fn update_quote(&self, quote: Quote) -> Result<(), QuotingError> {
        let hitting_logic = self.params.read().hitting_logic;
        let best = self.best_book.best(self.instrument.id);

        let mut quote = quote;
        quote.price = apply_hitting_logic(
            hitting_logic,
            self.side,
            quote.price,
            best,
            self.instrument.tick_size,
        );

        // Spot-sell safety: never offer more than the available position
        if self.side == Side::Sell && self.instrument.product == ProductType::Spot {
            if let Some(position) = &self.position {
                let available = position.available_position(self.instrument.id);
                quote.size = quote.size.min(available);
                if quote.size < self.instrument.min_order_size {
                    debug!(
                        instrument = %self.instrument,
                        %available,
                        "available position below minimum, withdrawing ask"
                    );
                    return self.cancel_quote().await;
                }
            }
        }

        let mut state = self.state.lock().await;

        let Some(active) = state.active.as_ref() else {
            return self.submit_locked(&mut state, quote).await;
        };

        if active.price == quote.price {
            return Ok(());
        }

        if active.is_partially_filled() && !self.near_mid(quote.price, best) {
            // Partially filled away from the mid: take liquidity off
            // instead of chasing with a replace
            return self.cancel_active_locked(&mut state).await;
        }

        if self.gateway.supports_replace() {
            let client_order_id = active.client_order_id;
            let report = self
                .gateway
                .replace(client_order_id, quote.price, self.order_kind())
                .await
                .map_err(QuotingError::from)?;

            if let Some(active) = state.active.as_mut() {
                active.price = quote.price;
            }
            if let Some(staged) = self.apply_report_locked(&mut state, &report) {
                self.submit_locked(&mut state, staged).await?;
            }
            Ok(())
        } else {
            state.pending_reentry = Some(quote);
            self.cancel_active_locked(&mut state).await
        }
    }

    async fn cancel_quote(&self) -> Result<(), QuotingError> {
        let mut state = self.state.lock().await;
        state.pending_reentry = None;
        self.cancel_active_locked(&mut state).await
    }

    async fn cancel_all(&self) -> Result<(), QuotingError> {
        self.cancel_quote().await
    }

    async fn on_order_status(&self, report: OrderStatusReport) {
        let mut state = self.state.lock().await;
        if let Some(staged) = self.apply_report_locked(&mut state, &report) {
            if let Err(error) = self.submit_locked(&mut state, staged).await {
                warn!(
                    instrument = %self.instrument,
                    side = %self.side,
                    %error,
                    "re-entry submission failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arara_data::order::ClientOrderId;
    use arara_execution::ExecutionError;
    use arara_markets::{Currency, ExchangeId, InstrumentId, Quantity};
    use parking_lot::Mutex as PlMutex;
    use smol_str::SmolStr;

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
            min_order_size: Quantity::from_raw(1_000),
        }
    }

    struct MockGateway {
        supports_replace: bool,
        actions: PlMutex<Vec<String>>,
    }

    impl MockGateway {
        fn new(supports_replace: bool) -> Arc<Self> {
            Arc::new(Self {
                supports_replace,
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
        fn supports_replace(&self) -> bool {
            self.supports_replace
        }

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
            self.actions.lock().push("bulk_cancel".into());
            client_order_ids
                .into_iter()
                .map(|id| (id, Ok(Self::report(id, OrderStatus::Cancelled, Price::ZERO))))
                .collect()
        }
    }

    struct StaticPosition(Quantity);

    impl PositionSource for StaticPosition {
        fn available_position(&self, _instrument_id: InstrumentId) -> Quantity {
            self.0
        }
    }

    struct Harness {
        quoter: Arc<SingleOrderQuoter>,
        gateway: Arc<MockGateway>,
        events: Arc<QuotingEvents>,
        best_book: Arc<BestBookTracker>,
    }

    fn harness(side: Side, supports_replace: bool, position: Option<Quantity>) -> Harness {
        let gateway = MockGateway::new(supports_replace);
        let events = QuotingEvents::new();
        let best_book = BestBookTracker::new();
        let quoter = SingleOrderQuoter::new(
            instrument(),
            side,
            Arc::clone(&gateway) as Arc<dyn OrderGateway>,
            Arc::new(OrderBuilder::new(false)),
            Arc::clone(&best_book),
            Arc::new(RwLock::new(QuotingParameters::default())),
            Arc::clone(&events),
            position.map(|available| Arc::new(StaticPosition(available)) as Arc<dyn PositionSource>),
        );
        Harness {
            quoter,
            gateway,
            events,
            best_book,
        }
    }

    fn quote(price: i64) -> Quote {
        Quote::new(Price::from_raw(price), Quantity::from_raw(10_000))
    }

    #[tokio::test]
    async fn test_submit_then_noop_then_replace() {
        let harness = harness(Side::Buy, true, None);

        harness.quoter.update_quote(quote(1_000_000)).await.unwrap();
        // Unchanged price: exactly no gateway action
        harness.quoter.update_quote(quote(1_000_000)).await.unwrap();
        harness.quoter.update_quote(quote(2_000_000)).await.unwrap();

        assert_eq!(
            harness.gateway.actions(),
            vec!["submit:1000000", "replace:2000000"]
        );
    }

    #[tokio::test]
    async fn test_cancel_and_stage_reentry_without_replace_support() {
        let harness = harness(Side::Buy, false, None);

        harness.quoter.update_quote(quote(1_000_000)).await.unwrap();
        // Inline cancel response is terminal: the staged re-entry submits
        // in the same call
        harness.quoter.update_quote(quote(2_000_000)).await.unwrap();

        assert_eq!(
            harness.gateway.actions(),
            vec!["submit:1000000", "cancel", "submit:2000000"]
        );
    }

    #[tokio::test]
    async fn test_partial_fill_far_from_mid_cancels() {
        let harness = harness(Side::Buy, true, None);
        // mid = 100.00
        harness.best_book.set(
            InstrumentId(1),
            BestBook {
                bid: Some(Price::from_raw(9_999_000_000)),
                ask: Some(Price::from_raw(10_001_000_000)),
            },
        );

        harness.quoter.update_quote(quote(9_999_000_000)).await.unwrap();

        // Venue reports a partial fill
        let mut report =
            MockGateway::report(active_id(&harness).await, OrderStatus::PartiallyFilled, Price::ZERO);
        report.last_quantity = Quantity::from_raw(1_000);
        report.leaves_quantity = Quantity::from_raw(9_000);
        harness.quoter.on_order_status(report).await;

        // New target far below the mid: cancel, do not replace
        harness.quoter.update_quote(quote(9_900_000_000)).await.unwrap();
        assert_eq!(
            harness.gateway.actions(),
            vec!["submit:9999000000", "cancel"]
        );
    }

    async fn active_id(harness: &Harness) -> ClientOrderId {
        harness
            .quoter
            .state
            .lock()
            .await
            .active
            .as_ref()
            .expect("active order")
            .client_order_id
    }

    #[tokio::test]
    async fn test_spot_sell_clamp_below_minimum_cancels() {
        let harness = harness(Side::Sell, true, Some(Quantity::from_raw(500)));

        // Below min_order_size (1000): no submission happens
        harness.quoter.update_quote(quote(1_000_000)).await.unwrap();
        assert!(harness.gateway.actions().is_empty());
    }

    #[tokio::test]
    async fn test_spot_sell_clamps_size_to_position() {
        let harness = harness(Side::Sell, true, Some(Quantity::from_raw(4_000)));

        harness.quoter.update_quote(quote(1_000_000)).await.unwrap();
        let state = harness.quoter.state.lock().await;
        assert_eq!(
            state.active.as_ref().unwrap().quantity,
            Quantity::from_raw(4_000)
        );
    }

    #[tokio::test]
    async fn test_full_fill_fires_event_and_clears_slot() {
        let harness = harness(Side::Buy, true, None);
        let fills = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&fills);
        harness
            .events
            .order_fully_filled
            .subscribe(move |event: &OrderFullyFilled| {
                sink.lock().push(*event);
            });

        harness.quoter.update_quote(quote(1_000_000)).await.unwrap();
        let id = active_id(&harness).await;

        harness
            .quoter
            .on_order_status(MockGateway::report(id, OrderStatus::Filled, Price::ZERO))
            .await;

        assert_eq!(fills.lock().len(), 1);
        assert_eq!(fills.lock()[0].client_order_id, id);
        assert!(harness.quoter.state.lock().await.active.is_none());

        // A fresh target after the fill submits a new order
        harness.quoter.update_quote(quote(1_000_000)).await.unwrap();
        assert_eq!(
            harness.gateway.actions(),
            vec!["submit:1000000", "submit:1000000"]
        );
    }

    #[tokio::test]
    async fn test_pennying_applied_before_submission() {
        use crate::config::HittingLogic;

        let harness = harness(Side::Buy, true, None);
        harness.quoter.params.write().hitting_logic = HittingLogic::Pennying;
        // bestBid=100.00, bestAsk=100.03
        harness.best_book.set(
            InstrumentId(1),
            BestBook {
                bid: Some(Price::from_raw(10_000_000_000)),
                ask: Some(Price::from_raw(10_003_000_000)),
            },
        );

        // Crossing target 100.05 is pennied to 100.01
        harness.quoter.update_quote(quote(10_005_000_000)).await.unwrap();
        assert_eq!(harness.gateway.actions(), vec!["submit:10001000000"]);
    }
}
