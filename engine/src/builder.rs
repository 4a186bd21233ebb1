//! Engine assembly and ordered shutdown.

use crate::config::SystemConfig;
use crate::error::EngineError;
use arara_data::adapter::AdapterOps;
use arara_data::books::pool::EntryPool;
use arara_data::connection::ConnectionCore;
use arara_data::feed::{EventDispatcher, FeedHandler};
use arara_data::order::{Fill, OrderStatusReport};
use arara_execution::{OrderBuilder, OrderGateway};
use arara_markets::{InstrumentId, InstrumentRepository, Side};
use arara_quoting::book::BestBookTracker;
use arara_quoting::engine::QuotingEngine;
use arara_quoting::events::QuotingEvents;
use arara_quoting::fair_value::FairValueProvider;
use arara_quoting::maker::MarketMaker;
use arara_quoting::position::PositionSource;
use arara_quoting::quoter::{LayeredQuoter, SideQuoter, SingleOrderQuoter};
use arara_quoting::validator::QuoteValidator;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Deadline for each best-effort quoter cancel during shutdown.
const SHUTDOWN_CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Quoter topology for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoterLayout {
    /// One live order per side.
    Single,
    /// Up to `depth` layered orders per side.
    Layered { depth: usize },
}

struct QuotingUnit {
    instrument_id: InstrumentId,
    engine: Arc<QuotingEngine>,
    bid: Arc<dyn SideQuoter>,
    ask: Arc<dyn SideQuoter>,
}

impl fmt::Debug for QuotingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotingUnit")
            .field("instrument", &self.instrument_id)
            .finish()
    }
}

/// Builder wiring the feed, quoting stack and external collaborators.
pub struct EngineBuilder {
    config: SystemConfig,
    repository: Arc<dyn InstrumentRepository>,
    dispatcher: Arc<EventDispatcher>,
    pool: Arc<EntryPool>,
    feed: FeedHandler,
    best_book: Arc<BestBookTracker>,
    gateway: Option<Arc<dyn OrderGateway>>,
    provider: Option<Arc<dyn FairValueProvider>>,
    position: Option<Arc<dyn PositionSource>>,
    quoted: Vec<(InstrumentId, QuoterLayout)>,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("quoted", &self.quoted)
            .finish()
    }
}

impl EngineBuilder {
    pub fn new(config: SystemConfig, repository: Arc<dyn InstrumentRepository>) -> Self {
        let dispatcher = EventDispatcher::new();
        let feed = FeedHandler::new(Arc::clone(&dispatcher));
        let best_book = BestBookTracker::new();
        // Hitting logic reads best quotes straight off the feed
        best_book.attach(&dispatcher);

        Self {
            config,
            repository,
            dispatcher,
            pool: EntryPool::new(),
            feed,
            best_book,
            gateway: None,
            provider: None,
            position: None,
            quoted: Vec::new(),
        }
    }

    /// Dispatcher for constructing venue adapters against.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Shared depth-entry pool for adapters that parse into it.
    pub fn pool(&self) -> &Arc<EntryPool> {
        &self.pool
    }

    pub fn snapshot_depth_limit(&self) -> Option<u32> {
        self.config.snapshot_depth_limit
    }

    /// Take ownership of a venue adapter behind a fresh connection core.
    pub fn attach_adapter(&mut self, adapter: Arc<dyn AdapterOps>) -> Arc<ConnectionCore> {
        self.feed
            .attach(adapter, self.config.connection.to_connection_config())
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn OrderGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_fair_value_provider(mut self, provider: Arc<dyn FairValueProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_position_source(mut self, position: Arc<dyn PositionSource>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn quote_single(mut self, instrument_id: InstrumentId) -> Self {
        self.quoted.push((instrument_id, QuoterLayout::Single));
        self
    }

    pub fn quote_layered(mut self, instrument_id: InstrumentId, depth: usize) -> Self {
        self.quoted
            .push((instrument_id, QuoterLayout::Layered { depth }));
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let gateway = self
            .gateway
            .ok_or_else(|| EngineError::Builder("order gateway not provided".into()))?;
        let provider = self
            .provider
            .ok_or_else(|| EngineError::Builder("fair value provider not provided".into()))?;

        let mut units = Vec::with_capacity(self.quoted.len());
        for (instrument_id, layout) in self.quoted {
            let instrument = self
                .repository
                .get_by_id(instrument_id)
                .ok_or_else(|| {
                    EngineError::Builder(format!("unknown quoted instrument: {instrument_id}"))
                })?
                .clone();

            let params = Arc::new(RwLock::new(self.config.quoting.clone()));
            let events = QuotingEvents::new();
            let order_builder = Arc::new(OrderBuilder::new(self.config.quoting.post_only));

            let (bid, ask): (Arc<dyn SideQuoter>, Arc<dyn SideQuoter>) = match layout {
                QuoterLayout::Single => (
                    SingleOrderQuoter::new(
                        instrument.clone(),
                        Side::Buy,
                        Arc::clone(&gateway),
                        Arc::clone(&order_builder),
                        Arc::clone(&self.best_book),
                        Arc::clone(&params),
                        Arc::clone(&events),
                        None,
                    ),
                    SingleOrderQuoter::new(
                        instrument.clone(),
                        Side::Sell,
                        Arc::clone(&gateway),
                        Arc::clone(&order_builder),
                        Arc::clone(&self.best_book),
                        Arc::clone(&params),
                        Arc::clone(&events),
                        self.position.clone(),
                    ),
                ),
                QuoterLayout::Layered { depth } => (
                    LayeredQuoter::new(
                        instrument.clone(),
                        Side::Buy,
                        depth,
                        Arc::clone(&gateway),
                        Arc::clone(&order_builder),
                        Arc::clone(&self.best_book),
                        Arc::clone(&params),
                        Arc::clone(&events),
                    ),
                    LayeredQuoter::new(
                        instrument.clone(),
                        Side::Sell,
                        depth,
                        Arc::clone(&gateway),
                        Arc::clone(&order_builder),
                        Arc::clone(&self.best_book),
                        Arc::clone(&params),
                        Arc::clone(&events),
                    ),
                ),
            };

            let maker = MarketMaker::new(
                instrument_id,
                Arc::clone(&bid),
                Arc::clone(&ask),
                QuoteValidator::new(instrument.clone()),
                Arc::clone(&events),
            );

            let engine = QuotingEngine::new(
                instrument,
                Arc::clone(&provider),
                maker,
                params,
                Arc::clone(&events),
            );

            // Route fills into the engine's skew/cap counters
            let weak_engine: Weak<QuotingEngine> = Arc::downgrade(&engine);
            self.dispatcher.fills.subscribe(move |fill: &Fill| {
                if let Some(engine) = weak_engine.upgrade() {
                    engine.on_fill(fill);
                }
            });

            // Route private order reports to the owning side's quoter
            let weak_bid = Arc::downgrade(&bid);
            let weak_ask = Arc::downgrade(&ask);
            self.dispatcher
                .order_status
                .subscribe(move |report: &OrderStatusReport| {
                    if report.instrument_id != instrument_id {
                        return;
                    }
                    let target = match report.side {
                        Side::Buy => weak_bid.upgrade(),
                        Side::Sell => weak_ask.upgrade(),
                    };
                    if let Some(quoter) = target {
                        let report = report.clone();
                        tokio::spawn(async move {
                            quoter.on_order_status(report).await;
                        });
                    }
                });

            units.push(QuotingUnit {
                instrument_id,
                engine,
                bid,
                ask,
            });
        }

        Ok(Engine {
            feed: self.feed,
            best_book: self.best_book,
            units,
        })
    }
}

/// The assembled stack.
#[derive(Debug)]
pub struct Engine {
    feed: FeedHandler,
    best_book: Arc<BestBookTracker>,
    units: Vec<QuotingUnit>,
}

impl Engine {
    pub fn feed(&self) -> &FeedHandler {
        &self.feed
    }

    pub fn best_book(&self) -> &Arc<BestBookTracker> {
        &self.best_book
    }

    pub fn quoting_engines(&self) -> impl Iterator<Item = &Arc<QuotingEngine>> {
        self.units.iter().map(|unit| &unit.engine)
    }

    /// Connect every adapter and start + activate every quoting unit.
    pub fn start(&self) {
        self.feed.connect_all();
        for unit in &self.units {
            unit.engine.start();
            unit.engine.activate();
        }
        info!(units = self.units.len(), "engine started");
    }

    /// Ordered shutdown: stop quoting, best-effort cancel every side, then
    /// tear the feed down.
    pub async fn shutdown(self) {
        for unit in &self.units {
            unit.engine.deactivate();
            unit.engine.stop();
        }

        for unit in &self.units {
            for quoter in [&unit.bid, &unit.ask] {
                match timeout(SHUTDOWN_CANCEL_TIMEOUT, quoter.cancel_all()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => warn!(
                        instrument = %unit.instrument_id,
                        side = %quoter.side(),
                        %error,
                        "shutdown cancel failed"
                    ),
                    Err(_) => warn!(
                        instrument = %unit.instrument_id,
                        side = %quoter.side(),
                        "shutdown cancel timed out"
                    ),
                }
            }
        }

        self.feed.disconnect_all().await;
        info!("engine shutdown complete");
    }
}
