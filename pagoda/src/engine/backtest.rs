use crate::{
    context::{Context, EngineCore},
    engine::{
        DailyRecord,
        actions::{ActionEngine, ActionRecord},
    },
    error::PagodaError,
    event::Event,
    strategy::{LogNotifier, Strategy},
};
use chrono::{NaiveDate, NaiveDateTime};
use fnv::FnvHashMap;
use pagoda_data::{provider::DataProvider, request::Frequency};
use pagoda_execution::{
    client::simulator::SimulatorBroker, order::Order, portfolio::Portfolio, trade::Trade,
};
use pagoda_instrument::security::Security;
use rust_decimal::Decimal;
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, warn};

/// Inputs of one historical simulation.
#[derive(Debug, Clone)]
pub struct BacktestArgs {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub capital_base: Decimal,
    pub frequency: Frequency,
    pub benchmark: Option<Security>,
}

/// Everything a finished simulation produced.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub daily_records: Vec<DailyRecord>,
    pub trades: Vec<Trade>,
    pub orders: Vec<Order>,
    pub action_records: Vec<ActionRecord>,
    pub final_portfolio: Portfolio,
}

/// Deterministic historical driver.
///
/// Iterates trade days, precomputes each day's timeline, advances the virtual clock
/// through every timepoint and matches orders bar-synchronously against the in-process
/// portfolio.
#[derive(Debug)]
pub struct BacktestEngine {
    core: Arc<EngineCore>,
    strategy: Strategy,
    actions: ActionEngine,
}

impl BacktestEngine {
    pub fn new(provider: Arc<dyn DataProvider>, strategy: Strategy) -> Self {
        let core = EngineCore::new(provider, Decimal::ZERO, Arc::new(LogNotifier));
        *core.subscription_limit.write() = Some(SimulatorBroker::MAX_TICK_SUBSCRIPTIONS);
        Self {
            core,
            strategy,
            actions: ActionEngine::new(),
        }
    }

    pub fn context(&self) -> Context {
        Context::new(Arc::clone(&self.core))
    }

    pub async fn run(&mut self, args: BacktestArgs) -> Result<BacktestReport, PagodaError> {
        let ctx = self.context();
        {
            let mut settings = self.core.settings.write();
            settings.frequency = args.frequency;
            settings.benchmark = args.benchmark.clone();
        }
        *self.core.window_end.write() = Some(args.end_date);
        *self.core.portfolio.write() = Portfolio::new(args.capital_base);

        let trade_days = self.core.provider.get_trade_days(
            Some(args.start_date),
            Some(args.end_date),
            None,
        )?;
        if trade_days.is_empty() {
            warn!(
                start = %args.start_date,
                end = %args.end_date,
                "no trade days in window; nothing to simulate"
            );
            return Ok(self.report(Vec::new()));
        }

        // The trade day before the window feeds day one's weekday/monthday filters
        let mut previous = match args.start_date.pred_opt() {
            Some(before) => self
                .core
                .provider
                .get_trade_days(None, Some(before), Some(1))
                .ok()
                .and_then(|days| days.last().copied()),
            None => None,
        };

        {
            let periods = self.core.settings.read().market_periods.clone();
            *self.core.current_dt.write() = periods.session_open(trade_days[0]);
        }
        info!(
            start = %args.start_date,
            end = %args.end_date,
            days = trade_days.len(),
            capital_base = %args.capital_base,
            "backtest starting"
        );

        if let Some(initialize) = &self.strategy.initialize {
            initialize(ctx.clone());
        }
        if let Some(process_initialize) = &self.strategy.process_initialize {
            process_initialize(ctx.clone());
        }

        let mut daily_records = Vec::with_capacity(trade_days.len());
        for day in trade_days {
            let record = self.run_trade_day(&ctx, day, previous, &args).await?;
            daily_records.push(record);
            previous = Some(day);
        }

        info!(days = daily_records.len(), "backtest finished");
        Ok(self.report(daily_records))
    }

    async fn run_trade_day(
        &mut self,
        ctx: &Context,
        day: NaiveDate,
        previous: Option<NaiveDate>,
        args: &BacktestArgs,
    ) -> Result<DailyRecord, PagodaError> {
        let (periods, frequency) = {
            let settings = self.core.settings.read();
            (settings.market_periods.clone(), settings.frequency)
        };
        let open_dt = periods.session_open(day);
        let close_dt = periods.session_close(day);

        *self.core.current_dt.write() = open_dt;
        *self.core.previous_trade_day.write() = previous;
        self.core.risk.lock().reset_daily(day);

        // Before-open: corporate actions, then the T+1 closeable refresh
        let held: Vec<Security> = self.core.portfolio.read().positions.keys().cloned().collect();
        for security in &held {
            self.actions.ensure_loaded(
                self.core.provider.as_ref(),
                security,
                args.start_date,
                args.end_date,
            );
        }
        {
            let core = Arc::clone(&self.core);
            let mut portfolio = self.core.portfolio.write();
            self.actions.apply_for_day(day, &mut portfolio, |security| {
                core.is_security_halted_on(security, day)
            });
            portfolio.refresh_closeable();
        }

        if let Some(before_trading_start) = &self.strategy.before_trading_start {
            before_trading_start(ctx.clone());
        }
        self.core.bus.emit(Event::MarketOpen { time: open_dt }).await;

        // Merge the scheduled timeline with the day's bar timepoints
        let mut timeline =
            self.core
                .scheduler
                .generate_daily_schedule(day, previous, &periods, frequency);
        let bar_points: BTreeSet<NaiveDateTime> = match frequency {
            Frequency::Daily => std::iter::once(open_dt).collect(),
            Frequency::Minute => periods.session_minutes(day).into_iter().collect(),
        };
        for point in &bar_points {
            timeline.entry(*point).or_default();
        }
        let last_timepoint = timeline.keys().next_back().copied().unwrap_or(close_dt);

        for (timepoint, task_ids) in timeline {
            *self.core.current_dt.write() = timepoint;
            self.core.scheduler.trigger(&task_ids, ctx).await;

            if bar_points.contains(&timepoint)
                && let Some(handle_data) = &self.strategy.handle_data
            {
                handle_data(ctx.clone(), ctx.current_data());
            }

            self.core.bus.drain().await;
        }

        // End of day: mark-to-market, integrity checks, daily record. Post-close
        // tasks may already have advanced the clock past the session close.
        *self.core.current_dt.write() = close_dt.max(last_timepoint);
        self.mark_to_market();

        let record = {
            let portfolio = self.core.portfolio.read();
            let total_value = portfolio.total_value();
            if total_value < Decimal::ZERO {
                return Err(PagodaError::Fatal(format!(
                    "total value {total_value} negative after {day}"
                )));
            }
            if !portfolio.invariants_hold() {
                return Err(PagodaError::Fatal(format!(
                    "position invariants broken after {day}"
                )));
            }
            DailyRecord::new(day, portfolio.cash, total_value, portfolio.returns_since_inception())
        };

        if let Some(after_trading_end) = &self.strategy.after_trading_end {
            after_trading_end(ctx.clone());
        }
        self.core.bus.emit(Event::MarketClose { time: close_dt }).await;
        self.core.bus.drain().await;

        Ok(record)
    }

    /// Mark every open position to the day's close.
    fn mark_to_market(&self) {
        let held: Vec<Security> = self.core.portfolio.read().positions.keys().cloned().collect();
        let mut closes: FnvHashMap<Security, Decimal> = FnvHashMap::default();
        for security in held {
            match self.core.reference_price(&security) {
                Ok((price, _)) => {
                    closes.insert(security, price);
                }
                Err(error) => {
                    warn!(security = %security, %error, "no close price; keeping previous mark");
                }
            }
        }
        self.core
            .portfolio
            .write()
            .mark_to_market(|security| closes.get(security).copied());
    }

    fn report(&self, daily_records: Vec<DailyRecord>) -> BacktestReport {
        BacktestReport {
            daily_records,
            trades: self.core.trades.read().clone(),
            orders: self.core.orders.read().clone(),
            action_records: self.actions.records().to_vec(),
            final_portfolio: self.core.portfolio.read().clone(),
        }
    }
}
