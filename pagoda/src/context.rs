use crate::{
    config::RuntimeSettings,
    error::PagodaError,
    event::bus::EventBus,
    persist::GlobalStore,
    risk::RiskController,
    scheduler::{Overlap, Scheduler, TaskCallback, TaskId},
    strategy::Notifier,
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use indexmap::IndexSet;
use pagoda_data::{
    bar::Bar,
    provider::DataProvider,
    request::{Adjust, Frequency, PriceQuery},
};
use pagoda_execution::{
    error::ExecutionError,
    matching::{MatchConfig, MatchingEngine},
    order::{Order, OrderId, OrderStatus, OrderStyle},
    portfolio::Portfolio,
    pricing::{OrderCost, Slippage},
    trade::Trade,
};
use pagoda_instrument::{Side, lot::adjust_order_amount, security::Security};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::warn;

/// Where submitted orders go: matched in-process, or queued to a live dispatcher.
#[derive(Debug)]
pub enum OrderRouter {
    /// Bar-synchronous matching against the in-process portfolio.
    Simulated,
    /// Orders are queued for the live driver's broker dispatcher.
    Live(tokio::sync::mpsc::UnboundedSender<Order>),
}

/// State shared by the driver, the scheduler callbacks and the strategy API.
///
/// The driver owns the portfolio, order book and scheduler registry; strategy code
/// reaches them only through [`Context`]. Data providers are read-only collaborators.
pub struct EngineCore {
    pub provider: Arc<dyn DataProvider>,
    pub scheduler: Arc<Scheduler>,
    pub bus: Arc<EventBus>,
    pub settings: RwLock<RuntimeSettings>,
    pub portfolio: RwLock<Portfolio>,
    pub orders: RwLock<Vec<Order>>,
    pub trades: RwLock<Vec<Trade>>,
    pub current_dt: RwLock<NaiveDateTime>,
    pub previous_trade_day: RwLock<Option<NaiveDate>>,
    /// Window end of the active run; pins the pre-adjustment reference date.
    pub window_end: RwLock<Option<NaiveDate>>,
    pub risk: Mutex<RiskController>,
    pub g: GlobalStore,
    pub notifier: Arc<dyn Notifier>,
    pub router: RwLock<OrderRouter>,
    pub subscriptions: Mutex<IndexSet<Security>>,
    pub subscription_limit: RwLock<Option<usize>>,
    order_seq: AtomicU64,
}

impl std::fmt::Debug for EngineCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCore")
            .field("current_dt", &*self.current_dt.read())
            .field("orders", &self.orders.read().len())
            .field("trades", &self.trades.read().len())
            .finish()
    }
}

impl EngineCore {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        capital_base: Decimal,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            scheduler: Arc::new(Scheduler::new()),
            bus: Arc::new(EventBus::new()),
            settings: RwLock::new(RuntimeSettings::default()),
            portfolio: RwLock::new(Portfolio::new(capital_base)),
            orders: RwLock::new(Vec::new()),
            trades: RwLock::new(Vec::new()),
            current_dt: RwLock::new(NaiveDateTime::default()),
            previous_trade_day: RwLock::new(None),
            window_end: RwLock::new(None),
            risk: Mutex::new(RiskController::default()),
            g: GlobalStore::new(),
            notifier,
            router: RwLock::new(OrderRouter::Simulated),
            subscriptions: Mutex::new(IndexSet::new()),
            subscription_limit: RwLock::new(None),
            order_seq: AtomicU64::new(0),
        })
    }

    pub fn next_order_id(&self) -> OrderId {
        OrderId::from_seq(self.order_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn adjust_mode(&self) -> (Adjust, Option<NaiveDate>) {
        let use_real_price = self.settings.read().use_real_price;
        if use_real_price {
            (Adjust::None, None)
        } else {
            let window_end = *self.window_end.read();
            let ref_date = window_end.unwrap_or_else(|| self.current_dt.read().date());
            (Adjust::Pre, Some(ref_date))
        }
    }

    /// The match reference price at the current virtual time, with the halt flag of
    /// the owning daily bar.
    ///
    /// Before the first minute-bar close this is the day's opening price; inside the
    /// session it is the latest minute close; after the session close it is the daily
    /// close. A missing daily bar reads as halted.
    pub fn reference_price(&self, security: &Security) -> Result<(Decimal, bool), PagodaError> {
        let dt = *self.current_dt.read();
        let periods = self.settings.read().market_periods.clone();
        let day = dt.date();
        let open_dt = periods.session_open(day);
        let close_dt = periods.session_close(day);
        let first_minute_close = open_dt + TimeDelta::minutes(1);
        let (adjust, ref_date) = self.adjust_mode();

        let daily = self.provider.get_price(
            security,
            &PriceQuery::tail(dt.max(close_dt), 1, Frequency::Daily).with_adjust(adjust, ref_date),
        )?;
        let Some(daily_bar) = daily.last().copied() else {
            return Err(ExecutionError::NoReferencePrice {
                security: security.to_string(),
            }
            .into());
        };
        if daily_bar.time.date() != day {
            // No bar for the current day: conservatively halted, priced at last close
            return Ok((daily_bar.close, true));
        }
        let halted = daily_bar.is_halted();

        if dt < first_minute_close {
            return Ok((daily_bar.open, halted));
        }
        if dt >= close_dt {
            return Ok((daily_bar.close, halted));
        }

        let minutes = self.provider.get_price(
            security,
            &PriceQuery::tail(dt, 1, Frequency::Minute).with_adjust(adjust, ref_date),
        )?;
        match minutes.last() {
            Some(minute_bar) => Ok((minute_bar.close, halted)),
            None => Ok((daily_bar.close, halted)),
        }
    }

    /// Whether a security is halted on a trade day: provider flag, zero volume, or no
    /// data at all (conservative).
    pub fn is_security_halted_on(&self, security: &Security, day: NaiveDate) -> bool {
        let end = day.and_hms_opt(23, 59, 59).expect("valid time");
        match self
            .provider
            .get_price(security, &PriceQuery::tail(end, 1, Frequency::Daily))
        {
            Ok(bars) => match bars.last() {
                Some(bar) if bar.time.date() == day => bar.is_halted(),
                _ => true,
            },
            Err(_) => true,
        }
    }

    fn match_config(&self) -> MatchConfig {
        let settings = self.settings.read();
        MatchConfig {
            order_cost: settings.order_cost,
            slippage: settings.slippage,
            market_protect: settings.market_protect,
        }
    }

    /// Lot-round, risk-check and route an order. `signed_amount > 0` buys.
    pub fn submit_order(
        &self,
        security: &Security,
        signed_amount: i64,
        style: OrderStyle,
    ) -> Result<Option<OrderId>, PagodaError> {
        if signed_amount == 0 {
            return Ok(None);
        }
        let side = if signed_amount > 0 {
            Side::Buy
        } else {
            Side::Sell
        };

        let closeable = self.portfolio.read().closeable_amount(security);
        let amount = adjust_order_amount(security, signed_amount.abs(), side.is_buy(), closeable);
        if amount == 0 {
            warn!(
                security = %security,
                requested = signed_amount,
                closeable,
                "order amount rounds to zero; nothing submitted"
            );
            return Ok(None);
        }

        let (reference, halted) = self.reference_price(security)?;

        {
            let portfolio = self.portfolio.read();
            let value = reference * Decimal::from(amount);
            self.risk.lock().check_order(
                value,
                portfolio.positions.len(),
                Some(portfolio.total_value()),
                side,
            )?;
        }

        let id = self.next_order_id();
        let submitted_at = *self.current_dt.read();
        let mut order = Order::new(
            id.clone(),
            security.clone(),
            side,
            style,
            amount,
            submitted_at,
        );
        order.status = OrderStatus::Submitted;

        let live_tx = match &*self.router.read() {
            OrderRouter::Simulated => None,
            OrderRouter::Live(tx) => Some(tx.clone()),
        };

        if let Some(tx) = live_tx {
            self.orders.write().push(order.clone());
            tx.send(order).map_err(|_| {
                PagodaError::Execution(ExecutionError::Adapter("order channel closed".into()))
            })?;
            return Ok(Some(id));
        }

        let matching = MatchingEngine::new(self.match_config());
        let outcome = {
            let mut portfolio = self.portfolio.write();
            matching.match_order(&mut order, reference, halted, &mut portfolio)
        };

        match outcome {
            Ok(Some(trade)) => {
                self.risk.lock().record_trade(trade.value(), side);
                self.trades.write().push(trade);
                self.orders.write().push(order);
                Ok(Some(id))
            }
            Ok(None) => {
                self.orders.write().push(order);
                Ok(Some(id))
            }
            Err(error) => {
                self.orders.write().push(order);
                Err(error.into())
            }
        }
    }
}

fn is_derivative_symbol(symbol: &str) -> bool {
    let (code, suffix) = symbol.split_once('.').unwrap_or((symbol, ""));
    matches!(suffix, "XSGE" | "XDCE" | "XZCE" | "CCFX" | "XINE")
        || code.ends_with("8888")
        || code.ends_with("9999")
}

/// Handle passed to every strategy callback; the published runtime API surface.
///
/// Cheap to clone; all clones view the same engine state.
#[derive(Debug, Clone)]
pub struct Context {
    core: Arc<EngineCore>,
}

impl Context {
    pub fn new(core: Arc<EngineCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    // --- clock and portfolio views ---

    pub fn current_dt(&self) -> NaiveDateTime {
        *self.core.current_dt.read()
    }

    pub fn previous_trade_day(&self) -> Option<NaiveDate> {
        *self.core.previous_trade_day.read()
    }

    pub fn cash(&self) -> Decimal {
        self.core.portfolio.read().cash
    }

    pub fn total_value(&self) -> Decimal {
        self.core.portfolio.read().total_value()
    }

    pub fn position_amount(&self, security: &Security) -> i64 {
        self.core.portfolio.read().total_amount(security)
    }

    pub fn closeable_amount(&self, security: &Security) -> i64 {
        self.core.portfolio.read().closeable_amount(security)
    }

    pub fn portfolio_snapshot(&self) -> Portfolio {
        self.core.portfolio.read().clone()
    }

    pub fn g(&self) -> GlobalStore {
        self.core.g.clone()
    }

    // --- configuration ---

    pub fn set_option(&self, key: &str, value: serde_json::Value) {
        self.core.settings.write().set_option(key, value);
    }

    pub fn set_benchmark(&self, security: &str) -> Result<(), PagodaError> {
        let security = Security::parse(security)?;
        self.core.settings.write().benchmark = Some(security);
        Ok(())
    }

    pub fn set_slippage(&self, slippage: Slippage) {
        self.core.settings.write().slippage = slippage;
    }

    pub fn set_order_cost(&self, order_cost: OrderCost) {
        self.core.settings.write().order_cost = order_cost;
    }

    pub fn set_risk_config(&self, config: crate::risk::RiskConfig) {
        self.core.risk.lock().config = config;
    }

    pub fn risk_stats(&self) -> crate::risk::RiskStats {
        self.core.risk.lock().stats.clone()
    }

    // --- scheduling ---

    pub fn run_daily(&self, callback: TaskCallback, expr: &str) -> Result<TaskId, PagodaError> {
        Ok(self.core.scheduler.run_daily(callback, expr)?)
    }

    pub fn run_daily_with_overlap(
        &self,
        callback: TaskCallback,
        expr: &str,
        overlap: Overlap,
    ) -> Result<TaskId, PagodaError> {
        Ok(self
            .core
            .scheduler
            .run_daily_with_overlap(callback, expr, overlap)?)
    }

    pub fn run_weekly(
        &self,
        callback: TaskCallback,
        weekday: u32,
        expr: &str,
    ) -> Result<TaskId, PagodaError> {
        Ok(self.core.scheduler.run_weekly(callback, weekday, expr)?)
    }

    pub fn run_monthly(
        &self,
        callback: TaskCallback,
        monthday: u32,
        expr: &str,
    ) -> Result<TaskId, PagodaError> {
        Ok(self.core.scheduler.run_monthly(callback, monthday, expr)?)
    }

    pub fn unschedule(&self, id: TaskId) -> Result<(), PagodaError> {
        Ok(self.core.scheduler.unschedule(id)?)
    }

    pub fn unschedule_all(&self) {
        self.core.scheduler.unschedule_all();
    }

    // --- orders ---

    /// Submit a market order for a signed share amount; positive buys, negative sells.
    pub fn order(&self, security: &Security, amount: i64) -> Result<Option<OrderId>, PagodaError> {
        self.core.submit_order(security, amount, OrderStyle::market())
    }

    pub fn order_with_style(
        &self,
        security: &Security,
        amount: i64,
        style: OrderStyle,
    ) -> Result<Option<OrderId>, PagodaError> {
        self.core.submit_order(security, amount, style)
    }

    /// Buy or sell approximately `value` worth of the security at the current
    /// reference price.
    pub fn order_value(
        &self,
        security: &Security,
        value: Decimal,
    ) -> Result<Option<OrderId>, PagodaError> {
        let (reference, _) = self.core.reference_price(security)?;
        let amount = i64::try_from((value / reference).trunc()).unwrap_or(0);
        self.order(security, amount)
    }

    /// Move the holding to exactly `target` shares, diffing against the total amount.
    pub fn order_target(
        &self,
        security: &Security,
        target: i64,
    ) -> Result<Option<OrderId>, PagodaError> {
        let current = self.core.portfolio.read().total_amount(security);
        self.order(security, target - current)
    }

    /// Move the holding to approximately `target_value` at the current reference price.
    pub fn order_target_value(
        &self,
        security: &Security,
        target_value: Decimal,
    ) -> Result<Option<OrderId>, PagodaError> {
        let (reference, _) = self.core.reference_price(security)?;
        let target = i64::try_from((target_value / reference).trunc()).unwrap_or(0);
        self.order_target(security, target)
    }

    pub fn orders_snapshot(&self) -> Vec<Order> {
        self.core.orders.read().clone()
    }

    pub fn trades_snapshot(&self) -> Vec<Trade> {
        self.core.trades.read().clone()
    }

    // --- market data ---

    pub fn get_price(
        &self,
        security: &Security,
        query: &PriceQuery,
    ) -> Result<Vec<Bar>, PagodaError> {
        Ok(self.core.provider.get_price(security, query)?)
    }

    pub fn get_trade_days(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        count: Option<usize>,
    ) -> Result<Vec<NaiveDate>, PagodaError> {
        Ok(self.core.provider.get_trade_days(start, end, count)?)
    }

    pub fn get_all_securities(
        &self,
    ) -> Result<fnv::FnvHashMap<Security, pagoda_data::provider::SecurityInfo>, PagodaError> {
        Ok(self.core.provider.get_all_securities()?)
    }

    pub fn get_index_stocks(&self, index: &Security) -> Result<Vec<Security>, PagodaError> {
        Ok(self.core.provider.get_index_stocks(index)?)
    }

    pub fn current_data(&self) -> CurrentData {
        CurrentData {
            core: Arc::clone(&self.core),
        }
    }

    // --- subscriptions (live) ---

    /// Register tick subscriptions. Only `"tick"` frequency is accepted; derivative
    /// main-contract and index-future symbols are refused; the broker's subscription
    /// cap is enforced.
    pub fn subscribe<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a str>,
        frequency: &str,
    ) -> Result<Vec<Security>, PagodaError> {
        if frequency != "tick" {
            return Err(PagodaError::Subscription(format!(
                "unsupported subscription frequency: {frequency}"
            )));
        }

        let mut parsed = Vec::new();
        for symbol in symbols {
            if is_derivative_symbol(symbol) {
                return Err(PagodaError::Subscription(format!(
                    "main-contract / index-future symbols cannot be subscribed: {symbol}"
                )));
            }
            parsed.push(Security::parse(symbol)?);
        }

        // The configured subscribe_limit option tightens, but never exceeds, the
        // broker's own cap
        let broker_limit = *self.core.subscription_limit.read();
        let configured_limit = self.core.settings.read().subscribe_limit;
        let limit = match (configured_limit, broker_limit) {
            (Some(configured), Some(broker)) => Some(configured.min(broker)),
            (Some(configured), None) => Some(configured),
            (None, broker) => broker,
        };

        let mut subscriptions = self.core.subscriptions.lock();
        if let Some(limit) = limit {
            let new = parsed
                .iter()
                .filter(|security| !subscriptions.contains(*security))
                .count();
            if subscriptions.len() + new > limit {
                return Err(PagodaError::Subscription(format!(
                    "subscription limit {limit} exceeded"
                )));
            }
        }
        for security in &parsed {
            subscriptions.insert(security.clone());
        }
        Ok(parsed)
    }

    pub fn unsubscribe<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), PagodaError> {
        let mut subscriptions = self.core.subscriptions.lock();
        for symbol in symbols {
            let security = Security::parse(symbol)?;
            subscriptions.shift_remove(&security);
        }
        Ok(())
    }

    pub fn unsubscribe_all(&self) {
        self.core.subscriptions.lock().clear();
    }

    // --- notifications ---

    pub fn send_msg(&self, message: &str) {
        self.core.notifier.send_msg(message);
    }
}

/// Bar-level view of the market at the engine's current virtual time, handed to
/// `handle_data`.
#[derive(Debug, Clone)]
pub struct CurrentData {
    core: Arc<EngineCore>,
}

impl CurrentData {
    /// The current match reference price.
    pub fn price(&self, security: &Security) -> Option<Decimal> {
        self.core
            .reference_price(security)
            .ok()
            .map(|(price, _)| price)
    }

    /// Whether the security is halted on the current trade day.
    pub fn is_halted(&self, security: &Security) -> bool {
        self.core
            .is_security_halted_on(security, self.core.current_dt.read().date())
    }

    /// The latest bar at or before the current virtual time.
    pub fn bar(&self, security: &Security) -> Option<Bar> {
        let dt = *self.core.current_dt.read();
        let frequency = self.core.settings.read().frequency;
        self.core
            .provider
            .get_price(security, &PriceQuery::tail(dt, 1, frequency))
            .ok()
            .and_then(|bars| bars.last().copied())
    }
}
