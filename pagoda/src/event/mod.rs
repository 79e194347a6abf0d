use chrono::NaiveDateTime;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Priority-ordered message queue used by the drivers.
pub mod queue;

/// Typed event bus with priority-ordered subscribers.
pub mod bus;

/// Monotonically increasing event sequence. FIFO tiebreaker for equal
/// `(time, priority)` messages.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn fetch_add(&mut self) -> Sequence {
        let sequence = *self;
        self.0 += 1;
        sequence
    }
}

/// Engine event, a closed tagged union per variant.
///
/// Free-form payloads ride in `Custom::extra` as an explicit typed map rather than
/// bag-of-attributes access.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Event {
    /// Broker account state should be re-synchronised.
    AccountSync { time: NaiveDateTime },
    /// Open orders should be reconciled against the broker.
    OrdersSync { time: NaiveDateTime },
    /// First timepoint of the trading day.
    MarketOpen { time: NaiveDateTime },
    /// Last timepoint of the trading day.
    MarketClose { time: NaiveDateTime },
    /// A minute bar boundary.
    EveryMinute { time: NaiveDateTime },
    /// Strategy-defined event.
    Custom {
        name: SmolStr,
        time: NaiveDateTime,
        extra: serde_json::Value,
    },
}

/// Discriminant of an [`Event`], used for subscription routing.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AccountSync,
    OrdersSync,
    MarketOpen,
    MarketClose,
    EveryMinute,
    Custom,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AccountSync { .. } => EventKind::AccountSync,
            Event::OrdersSync { .. } => EventKind::OrdersSync,
            Event::MarketOpen { .. } => EventKind::MarketOpen,
            Event::MarketClose { .. } => EventKind::MarketClose,
            Event::EveryMinute { .. } => EventKind::EveryMinute,
            Event::Custom { .. } => EventKind::Custom,
        }
    }

    pub fn time(&self) -> NaiveDateTime {
        match self {
            Event::AccountSync { time }
            | Event::OrdersSync { time }
            | Event::MarketOpen { time }
            | Event::MarketClose { time }
            | Event::EveryMinute { time }
            | Event::Custom { time, .. } => *time,
        }
    }

    /// Predefined dispatch priority, higher first:
    /// AccountSync > OrdersSync > minute/open/close > default.
    pub fn priority(&self) -> u8 {
        match self.kind() {
            EventKind::AccountSync => EventPriority::ACCOUNT_SYNC,
            EventKind::OrdersSync => EventPriority::ORDERS_SYNC,
            EventKind::MarketOpen | EventKind::MarketClose | EventKind::EveryMinute => {
                EventPriority::EVERY_MINUTE
            }
            EventKind::Custom => EventPriority::DEFAULT,
        }
    }
}

/// The predefined priority bands.
#[derive(Debug, Copy, Clone)]
pub struct EventPriority;

impl EventPriority {
    pub const ACCOUNT_SYNC: u8 = 30;
    pub const ORDERS_SYNC: u8 = 20;
    pub const EVERY_MINUTE: u8 = 10;
    pub const DEFAULT: u8 = 0;
}

/// A queued event with its dispatch ordering key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Message {
    pub time: NaiveDateTime,
    pub priority: u8,
    pub seq: Sequence,
    pub event: Event,
}
