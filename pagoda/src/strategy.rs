use crate::context::{Context, CurrentData};
use std::sync::Arc;
use tracing::info;

pub type LifecycleFn = Arc<dyn Fn(Context) + Send + Sync>;
pub type HandleDataFn = Arc<dyn Fn(Context, CurrentData) + Send + Sync>;

/// The strategy contract: up to five optional callbacks invoked by the drivers.
///
/// `initialize` runs once at driver start, `process_initialize` immediately after it
/// (and again on live reconnects), `before_trading_start` / `after_trading_end` bracket
/// each trade day, and `handle_data` runs on each bar.
#[derive(Clone, Default)]
pub struct Strategy {
    pub initialize: Option<LifecycleFn>,
    pub process_initialize: Option<LifecycleFn>,
    pub before_trading_start: Option<LifecycleFn>,
    pub handle_data: Option<HandleDataFn>,
    pub after_trading_end: Option<LifecycleFn>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("initialize", &self.initialize.is_some())
            .field("process_initialize", &self.process_initialize.is_some())
            .field("before_trading_start", &self.before_trading_start.is_some())
            .field("handle_data", &self.handle_data.is_some())
            .field("after_trading_end", &self.after_trading_end.is_some())
            .finish()
    }
}

impl Strategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initialize<F>(mut self, f: F) -> Self
    where
        F: Fn(Context) + Send + Sync + 'static,
    {
        self.initialize = Some(Arc::new(f));
        self
    }

    pub fn with_process_initialize<F>(mut self, f: F) -> Self
    where
        F: Fn(Context) + Send + Sync + 'static,
    {
        self.process_initialize = Some(Arc::new(f));
        self
    }

    pub fn with_before_trading_start<F>(mut self, f: F) -> Self
    where
        F: Fn(Context) + Send + Sync + 'static,
    {
        self.before_trading_start = Some(Arc::new(f));
        self
    }

    pub fn with_handle_data<F>(mut self, f: F) -> Self
    where
        F: Fn(Context, CurrentData) + Send + Sync + 'static,
    {
        self.handle_data = Some(Arc::new(f));
        self
    }

    pub fn with_after_trading_end<F>(mut self, f: F) -> Self
    where
        F: Fn(Context) + Send + Sync + 'static,
    {
        self.after_trading_end = Some(Arc::new(f));
        self
    }
}

/// Outbound notification seam behind the strategy `send_msg` API.
///
/// Concrete transports (mail, webhooks, IM bridges) are external collaborators; the
/// default simply logs.
pub trait Notifier: Send + Sync {
    fn send_msg(&self, message: &str);
}

/// Default [`Notifier`] that records notifications in the engine log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_msg(&self, message: &str) {
        info!(target: "pagoda::notify", message);
    }
}
