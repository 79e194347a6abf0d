#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Pagoda
//! Pagoda is a trading-strategy runtime for A-share markets: the same user-written
//! strategy runs under a deterministic historical simulation and under a live driver
//! bound to an external brokerage.
//!
//! At a high level, it provides:
//! * A time-driven `Scheduler` resolving symbolic time expressions (`open-30m`,
//!   `every_bar`, `close+30s`, weekday/monthday filters) against daily market sessions,
//!   with per-task overlap policies.
//! * An event loop advancing the strategy through simulated or wall-clock time,
//!   dispatching priority-ordered events.
//! * An order matching and lifecycle engine covering lot rules, the price cage, tick
//!   rounding, slippage, fees, position averaging and T+1 accounting.
//! * A corporate-action engine applying cash dividends and share splits on ex-dates,
//!   deferring while a security is halted.

/// Strategy-visible engine state: [`Context`](context::Context), the shared
/// [`EngineCore`](context::EngineCore), and the published runtime API surface.
pub mod context;

/// Runtime options mutable from strategy code.
pub mod config;

/// Backtest and live drivers, plus the corporate-action engine.
pub mod engine;

/// Typed events, the priority message queue, and the event bus.
pub mod event;

/// Defines all possible errors in Pagoda.
pub mod error;

/// Provides default Pagoda Tracing logging initialisers.
pub mod logging;

/// Strategy global state `g` and its durable live-mode persistence.
pub mod persist;

/// Threshold-based order vetoes.
pub mod risk;

/// Task registry, symbolic time expressions and per-day timeline generation.
pub mod scheduler;

/// The strategy contract and notification seam.
pub mod strategy;
