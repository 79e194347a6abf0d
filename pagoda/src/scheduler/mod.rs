use crate::{
    context::Context,
    scheduler::{error::SchedulerError, expr::TimeExpression},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use derive_more::Display;
use fnv::FnvHashMap;
use futures::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use pagoda_data::request::Frequency;
use pagoda_instrument::calendar::MarketPeriods;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tracing::debug;

/// Symbolic time expressions.
pub mod expr;

/// Defines all possible scheduler errors.
pub mod error;

/// Identifier handed out by task registration; used to unschedule or toggle the task.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub struct TaskId(pub u64);

/// Day filter of a scheduled task.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TaskScope {
    /// Every trade day.
    Daily,
    /// Trade days falling on this weekday, Monday = 0.
    Weekday(u32),
    /// Once per calendar month, on the first trade day whose day-of-month is at least
    /// the given value; rolls forward across weekends and holidays.
    Monthday(u32),
}

/// What to do when a new trigger fires while the task's previous invocation is still
/// running.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Overlap {
    /// Drop the new trigger.
    #[default]
    Skip,
    /// Serialize; the new trigger runs after the previous completes.
    Wait,
    /// Run both concurrently.
    Concurrent,
}

pub type TaskFuture = BoxFuture<'static, ()>;
pub type TaskCallback = Arc<dyn Fn(Context) -> TaskFuture + Send + Sync>;

/// Wrap a synchronous callback. The body runs when the task future is polled, not at
/// dispatch.
pub fn callback<F>(f: F) -> TaskCallback
where
    F: Fn(Context) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |ctx| {
        let f = Arc::clone(&f);
        async move { f(ctx) }.boxed()
    })
}

/// Wrap an asynchronous callback.
pub fn async_callback<F, Fut>(f: F) -> TaskCallback
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// A registered task.
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub callback: TaskCallback,
    pub expr: TimeExpression,
    pub scope: TaskScope,
    pub overlap: Overlap,
    pub enabled: bool,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("expr", &self.expr)
            .field("scope", &self.scope)
            .field("overlap", &self.overlap)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Per-task execution state backing the overlap policies.
#[derive(Debug, Default)]
struct RunState {
    in_flight: AtomicBool,
    serial: tokio::sync::Mutex<()>,
}

/// Registry of scheduled tasks and generator of per-day timelines.
///
/// Timeline generation is a pure function of (tasks, trade day, previous trade day,
/// periods, frequency); registrations made while a day is running take effect from the
/// next generated timeline.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: RwLock<IndexMap<TaskId, ScheduledTask>>,
    next_id: AtomicU64,
    run_states: Mutex<FnvHashMap<TaskId, Arc<RunState>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &self,
        callback: TaskCallback,
        expr: &str,
        scope: TaskScope,
        overlap: Overlap,
    ) -> Result<TaskId, SchedulerError> {
        let expr = TimeExpression::parse(expr)?;
        match scope {
            TaskScope::Weekday(weekday) if weekday > 6 => {
                return Err(SchedulerError::InvalidWeekday(weekday));
            }
            TaskScope::Monthday(monthday) if !(1..=31).contains(&monthday) => {
                return Err(SchedulerError::InvalidMonthday(monthday));
            }
            _ => {}
        }

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tasks.write().insert(
            id,
            ScheduledTask {
                id,
                callback,
                expr,
                scope,
                overlap,
                enabled: true,
            },
        );
        debug!(task = %id, ?scope, "task registered");
        Ok(id)
    }

    /// Register a task firing on every trade day, with the default SKIP overlap policy.
    pub fn run_daily(&self, callback: TaskCallback, expr: &str) -> Result<TaskId, SchedulerError> {
        self.register(callback, expr, TaskScope::Daily, Overlap::Skip)
    }

    /// Register a daily task with an explicit overlap policy.
    pub fn run_daily_with_overlap(
        &self,
        callback: TaskCallback,
        expr: &str,
        overlap: Overlap,
    ) -> Result<TaskId, SchedulerError> {
        self.register(callback, expr, TaskScope::Daily, overlap)
    }

    /// Register a task firing on trade days of the given weekday (Monday = 0).
    pub fn run_weekly(
        &self,
        callback: TaskCallback,
        weekday: u32,
        expr: &str,
    ) -> Result<TaskId, SchedulerError> {
        self.register(callback, expr, TaskScope::Weekday(weekday), Overlap::Skip)
    }

    /// Register a task firing once per month, rolled forward to the first trade day
    /// whose day-of-month is at least `monthday`.
    pub fn run_monthly(
        &self,
        callback: TaskCallback,
        monthday: u32,
        expr: &str,
    ) -> Result<TaskId, SchedulerError> {
        self.register(callback, expr, TaskScope::Monthday(monthday), Overlap::Skip)
    }

    pub fn unschedule(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.tasks
            .write()
            .shift_remove(&id)
            .map(|_| ())
            .ok_or(SchedulerError::UnknownTask(id.0))
    }

    pub fn unschedule_all(&self) {
        self.tasks.write().clear();
        self.run_states.lock().clear();
    }

    pub fn set_enabled(&self, id: TaskId, enabled: bool) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(&id).ok_or(SchedulerError::UnknownTask(id.0))?;
        task.enabled = enabled;
        Ok(())
    }

    pub fn enable(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.set_enabled(id, true)
    }

    pub fn disable(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.set_enabled(id, false)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether a monthly task already fired this month, derived from the previous
    /// trade day rather than mutable state so generation stays pure.
    fn monthday_matches(day: NaiveDate, previous: Option<NaiveDate>, monthday: u32) -> bool {
        if day.day() < monthday {
            return false;
        }
        match previous {
            Some(previous) => {
                let same_month = previous.year() == day.year() && previous.month() == day.month();
                !(same_month && previous.day() >= monthday)
            }
            None => true,
        }
    }

    fn scope_matches(scope: TaskScope, day: NaiveDate, previous: Option<NaiveDate>) -> bool {
        match scope {
            TaskScope::Daily => true,
            TaskScope::Weekday(weekday) => day.weekday().num_days_from_monday() == weekday,
            TaskScope::Monthday(monthday) => Self::monthday_matches(day, previous, monthday),
        }
    }

    /// Build the ordered timeline of one trade day.
    ///
    /// Buckets preserve registration order; tasks at the same timepoint execute in
    /// that order, not by any priority.
    pub fn generate_daily_schedule(
        &self,
        day: NaiveDate,
        previous: Option<NaiveDate>,
        periods: &MarketPeriods,
        frequency: Frequency,
    ) -> BTreeMap<NaiveDateTime, Vec<TaskId>> {
        let mut timeline: BTreeMap<NaiveDateTime, Vec<TaskId>> = BTreeMap::new();

        for task in self.tasks.read().values() {
            if !task.enabled || !Self::scope_matches(task.scope, day, previous) {
                continue;
            }
            for timepoint in task.expr.resolve(day, periods, frequency) {
                let bucket = timeline.entry(timepoint).or_default();
                if !bucket.contains(&task.id) {
                    bucket.push(task.id);
                }
            }
        }

        timeline
    }

    fn run_state(&self, id: TaskId) -> Arc<RunState> {
        Arc::clone(self.run_states.lock().entry(id).or_default())
    }

    /// Create the policy-wrapped futures for one timepoint's bucket without running
    /// them. SKIP drops triggers whose previous invocation is still in flight.
    pub fn dispatch(&self, task_ids: &[TaskId], ctx: &Context) -> Vec<TaskFuture> {
        let tasks = self.tasks.read();
        let mut futures = Vec::with_capacity(task_ids.len());

        for id in task_ids {
            let Some(task) = tasks.get(id) else {
                continue;
            };
            if !task.enabled {
                continue;
            }

            let state = self.run_state(*id);
            let callback = Arc::clone(&task.callback);
            let ctx = ctx.clone();

            match task.overlap {
                Overlap::Skip => {
                    if state
                        .in_flight
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        debug!(task = %id, "previous invocation in flight; trigger skipped");
                        continue;
                    }
                    futures.push(
                        async move {
                            callback(ctx).await;
                            state.in_flight.store(false, Ordering::SeqCst);
                        }
                        .boxed(),
                    );
                }
                Overlap::Wait => {
                    futures.push(
                        async move {
                            let _serialised = state.serial.lock().await;
                            callback(ctx).await;
                        }
                        .boxed(),
                    );
                }
                Overlap::Concurrent => futures.push(callback(ctx)),
            }
        }

        futures
    }

    /// Dispatch one timepoint's bucket and await every admitted invocation.
    ///
    /// Futures are polled in bucket order, so synchronous callbacks complete in
    /// registration order; asynchronous callbacks interleave cooperatively.
    pub async fn trigger(&self, task_ids: &[TaskId], ctx: &Context) {
        let futures = self.dispatch(task_ids, ctx);
        futures::future::join_all(futures).await;
    }
}
