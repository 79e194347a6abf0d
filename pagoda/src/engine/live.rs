use crate::{
    context::{Context, EngineCore, OrderRouter},
    error::PagodaError,
    event::Event,
    persist::{Autosave, StateFile},
    strategy::{LogNotifier, Strategy},
};
use chrono::NaiveDate;
use fnv::FnvHashMap;
use pagoda_data::provider::DataProvider;
use pagoda_execution::{
    client::{BrokerAdapter, BrokerOrder},
    error::ExecutionError,
    order::{Order, OrderId, OrderStatus, OrderStyle},
    position::Position,
    pricing::{market_protect_price, price_cage, resolve_market_percent},
};
use pagoda_instrument::{Side, calendar::is_event_expired};
use rust_decimal::Decimal;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const ORDER_POLL_INTERVAL: Duration = Duration::from_millis(200);
const EXPIRED_TRIGGER_GRACE_SECS: i64 = 60;

/// Wall-clock driver bound to a [`BrokerAdapter`].
///
/// Merges the scheduler timeline for the current calendar day with broker-fed account
/// state, routes strategy orders through the adapter (with automatic splitting and
/// bounded status polling), and persists the strategy globals across restarts.
#[derive(Debug)]
pub struct LiveEngine<Broker: BrokerAdapter> {
    core: Arc<EngineCore>,
    strategy: Strategy,
    broker: Arc<Broker>,
    state_file: StateFile,
    order_rx: mpsc::UnboundedReceiver<Order>,
    /// Internal order id -> external child order ids issued for it.
    child_orders: FnvHashMap<OrderId, Vec<OrderId>>,
}

impl<Broker: BrokerAdapter + 'static> LiveEngine<Broker> {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        strategy: Strategy,
        broker: Arc<Broker>,
        runtime_dir: impl Into<PathBuf>,
        capital_base: Decimal,
    ) -> Result<Self, PagodaError> {
        let core = EngineCore::new(provider, capital_base, Arc::new(LogNotifier));
        let (order_tx, order_rx) = mpsc::unbounded_channel();
        *core.router.write() = OrderRouter::Live(order_tx);
        *core.subscription_limit.write() = broker.max_tick_subscriptions();

        let state_file = StateFile::new(runtime_dir)?;
        if state_file.load(&core.g)? {
            info!(path = %state_file.path().display(), "strategy globals rehydrated");
        }

        Ok(Self {
            core,
            strategy,
            broker,
            state_file,
            order_rx,
            child_orders: FnvHashMap::default(),
        })
    }

    pub fn context(&self) -> Context {
        Context::new(Arc::clone(&self.core))
    }

    pub fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    pub fn state_file(&self) -> &StateFile {
        &self.state_file
    }

    /// Connect the broker, pull the account snapshot, and run the strategy's
    /// initialisation hooks. `process_initialize` doubles as the reconnect hook.
    pub async fn initialize(&mut self) -> Result<(), PagodaError> {
        self.broker.connect().await?;
        self.sync_account().await?;

        let ctx = self.context();
        if let Some(initialize) = &self.strategy.initialize {
            initialize(ctx.clone());
        }
        if let Some(process_initialize) = &self.strategy.process_initialize {
            process_initialize(ctx.clone());
        }
        self.drain_order_queue().await;
        self.state_file.save(&self.core.g)?;
        Ok(())
    }

    /// Replace the portfolio view with the broker's account snapshot.
    pub async fn sync_account(&self) -> Result<(), PagodaError> {
        let info = self.broker.account_info().await?;
        let broker_positions = self.broker.positions().await?;

        let mut portfolio = self.core.portfolio.write();
        portfolio.cash = info.available_cash;
        portfolio.positions = broker_positions
            .into_iter()
            .map(|broker_position| {
                let position = Position {
                    security: broker_position.security.clone(),
                    total_amount: broker_position.amount,
                    closeable_amount: broker_position.closeable,
                    avg_cost: broker_position.avg_cost,
                    last_price: broker_position.avg_cost,
                };
                (broker_position.security, position)
            })
            .collect();
        debug!(cash = %portfolio.cash, positions = portfolio.positions.len(), "account synced");
        Ok(())
    }

    /// Reconciliation sweep: discover terminal states of orders whose polling window
    /// expired.
    pub async fn sync_orders(&mut self) -> Result<(), PagodaError> {
        let broker_orders = self.broker.sync_orders().await?;
        let by_id: FnvHashMap<&OrderId, &BrokerOrder> = broker_orders
            .iter()
            .map(|order| (&order.order_id, order))
            .collect();

        let mut orders = self.core.orders.write();
        for order in orders.iter_mut().filter(|order| !order.is_terminal()) {
            let Some(children) = self.child_orders.get(&order.id) else {
                continue;
            };
            let states: Vec<&BrokerOrder> = children
                .iter()
                .filter_map(|child| by_id.get(child).copied())
                .collect();
            if states.len() == children.len() {
                apply_children_to_order(order, &states);
            }
        }
        Ok(())
    }

    /// Route one queued order to the broker, splitting it into children of at most
    /// `order_max_volume`, and poll for terminal status subject to
    /// `trade_max_wait_time` (0 = fire-and-forget). Returns the first child's id.
    pub async fn dispatch_order(&mut self, order: Order) -> Result<OrderId, PagodaError> {
        if order.amount <= 0 {
            return Err(ExecutionError::InvalidOrder(format!(
                "non-positive amount {} for {}",
                order.amount, order.security
            ))
            .into());
        }
        let (max_volume, wait_secs) = {
            let settings = self.core.settings.read();
            (settings.order_max_volume.max(1), settings.trade_max_wait_time)
        };
        let price = match order.style {
            OrderStyle::Limit { price } => Some(price),
            OrderStyle::Market { protect_percent } => self.protect_price(&order, protect_percent),
        };

        let mut children = Vec::new();
        let mut remaining = order.amount;
        while remaining > 0 {
            let amount = remaining.min(max_volume);
            let submitted = match order.side {
                Side::Buy => self.broker.buy(&order.security, amount, price).await,
                Side::Sell => self.broker.sell(&order.security, amount, price).await,
            };
            match submitted {
                Ok(external_id) => children.push(external_id),
                Err(error) if children.is_empty() => {
                    self.update_order(&order.id, |order| order.status = OrderStatus::Rejected);
                    return Err(error.into());
                }
                Err(error) => {
                    warn!(
                        order = %order.id,
                        %error,
                        "child order failed after partial submission; stopping split"
                    );
                    break;
                }
            }
            remaining -= amount;
        }

        let first = children.first().cloned().expect("split produced children");
        info!(
            order = %order.id,
            security = %order.security,
            amount = order.amount,
            children = children.len(),
            "order routed to broker"
        );
        self.child_orders.insert(order.id.clone(), children);

        if wait_secs > 0 {
            self.await_terminal(&order.id, wait_secs).await?;
        }
        Ok(first)
    }

    /// Poll the order's children until every one is terminal or the wait budget runs
    /// out; a timeout leaves the order `submitted` and queues an OrdersSync
    /// reconciliation.
    async fn await_terminal(&mut self, order_id: &OrderId, wait_secs: u64) -> Result<(), PagodaError> {
        let children = self
            .child_orders
            .get(order_id)
            .cloned()
            .unwrap_or_default();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(wait_secs);

        loop {
            let mut states = Vec::with_capacity(children.len());
            for child in &children {
                states.push(self.broker.order_status(child).await?);
            }

            if states.iter().all(|state| state.status.is_terminal()) {
                let refs: Vec<&BrokerOrder> = states.iter().collect();
                let mut orders = self.core.orders.write();
                if let Some(order) = orders.iter_mut().find(|order| &order.id == order_id) {
                    apply_children_to_order(order, &refs);
                }
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    order = %order_id,
                    wait_secs,
                    "order not terminal within wait budget; deferring to reconciliation"
                );
                self.core.bus.emit_nowait(Event::OrdersSync {
                    time: *self.core.current_dt.read(),
                });
                return Ok(());
            }
            tokio::time::sleep(ORDER_POLL_INTERVAL).await;
        }
    }

    /// Price a market order for the wire: the live quote pushed by the configured (or
    /// per-order) protect percent, clamped into the cage. Without a quote the order
    /// goes out unpriced and the broker applies its own protection.
    fn protect_price(&self, order: &Order, protect_percent: Option<Decimal>) -> Option<Decimal> {
        match self.core.provider.get_live_current(&order.security) {
            Ok(snapshot) => {
                let config = self.core.settings.read().market_protect;
                let percent = resolve_market_percent(protect_percent, order.side, &config);
                let cage = price_cage(&order.security, snapshot.last_price);
                Some(market_protect_price(
                    snapshot.last_price,
                    percent,
                    &cage,
                    order.side,
                ))
            }
            Err(error) => {
                debug!(security = %order.security, %error, "no live quote; market order sent unpriced");
                None
            }
        }
    }

    fn update_order(&self, order_id: &OrderId, mutate: impl FnOnce(&mut Order)) {
        let mut orders = self.core.orders.write();
        if let Some(order) = orders.iter_mut().find(|order| &order.id == order_id) {
            mutate(order);
        }
    }

    /// Drain strategy-submitted orders queued during callbacks.
    pub async fn drain_order_queue(&mut self) {
        while let Ok(order) = self.order_rx.try_recv() {
            if let Err(error) = self.dispatch_order(order).await {
                warn!(%error, "order dispatch failed");
            }
        }
    }

    /// Drive one calendar day against the wall clock.
    pub async fn run_day(&mut self, day: NaiveDate) -> Result<(), PagodaError> {
        let ctx = self.context();
        let (periods, frequency, autosave_secs) = {
            let settings = self.core.settings.read();
            (
                settings.market_periods.clone(),
                settings.frequency,
                settings.autosave_interval,
            )
        };
        let open_dt = periods.session_open(day);

        let previous = match day.pred_opt() {
            Some(before) => self
                .core
                .provider
                .get_trade_days(None, Some(before), Some(1))
                .ok()
                .and_then(|days| days.last().copied()),
            None => None,
        };
        *self.core.previous_trade_day.write() = previous;
        *self.core.current_dt.write() = open_dt;
        self.core.risk.lock().reset_daily(day);

        self.core.bus.emit(Event::AccountSync { time: open_dt }).await;
        self.sync_account().await?;

        if let Some(before_trading_start) = &self.strategy.before_trading_start {
            before_trading_start(ctx.clone());
        }
        self.drain_order_queue().await;
        self.state_file.save(&self.core.g)?;

        let autosave = Autosave::start(
            self.state_file.clone(),
            self.core.g.clone(),
            Duration::from_secs(autosave_secs.max(1)),
        );

        let timeline =
            self.core
                .scheduler
                .generate_daily_schedule(day, previous, &periods, frequency);
        for (timepoint, task_ids) in timeline {
            let now = chrono::Local::now().naive_local();
            if is_event_expired(timepoint, now, EXPIRED_TRIGGER_GRACE_SECS) {
                warn!(%timepoint, %now, "scheduled timepoint already expired; skipped");
                continue;
            }
            if timepoint > now
                && let Ok(until) = (timepoint - now).to_std()
            {
                tokio::time::sleep(until).await;
            }

            *self.core.current_dt.write() = timepoint;
            let delay = chrono::Local::now().naive_local() - timepoint;
            debug!(%timepoint, delay_ms = delay.num_milliseconds(), "dispatching timepoint");

            self.core.scheduler.trigger(&task_ids, &ctx).await;
            self.drain_order_queue().await;
            self.core.bus.drain().await;

            // Reconciliation for orders whose polling window expired
            let unresolved = self
                .core
                .orders
                .read()
                .iter()
                .any(|order| !order.is_terminal());
            if unresolved {
                if let Err(error) = self.sync_orders().await {
                    warn!(%error, "order reconciliation failed");
                }
            }

            if let Err(error) = self.state_file.save(&self.core.g) {
                warn!(%error, "state save after callbacks failed");
            }
        }

        if let Some(after_trading_end) = &self.strategy.after_trading_end {
            after_trading_end(ctx.clone());
        }
        self.drain_order_queue().await;
        autosave.stop();
        self.state_file.save(&self.core.g)?;
        Ok(())
    }
}

/// Fold terminal broker child states into the parent order record.
fn apply_children_to_order(order: &mut Order, children: &[&BrokerOrder]) {
    let filled: i64 = children.iter().map(|child| child.filled_amount).sum();
    if filled > 0 {
        let weighted: Decimal = children
            .iter()
            .filter_map(|child| {
                child
                    .price
                    .map(|price| price * Decimal::from(child.filled_amount))
            })
            .sum();
        let avg_price = weighted / Decimal::from(filled);
        let fillable = filled.min(order.amount - order.filled_amount);
        if fillable > 0 {
            order.record_fill(fillable, avg_price, Decimal::ZERO, Decimal::ZERO);
        }
    }
    if order.filled_amount < order.amount
        && children.iter().all(|child| child.status.is_terminal())
    {
        order.status = if order.filled_amount > 0 {
            OrderStatus::Partial
        } else {
            OrderStatus::Cancelled
        };
    }
}
