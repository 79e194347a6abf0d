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

//! # Pagoda-Execution
//! Orders, trades, positions and the portfolio cash ledger, together with the
//! bar-synchronous matching engine (slippage, price cage, tick rounding, fees) and the
//! [`BrokerAdapter`](client::BrokerAdapter) interface used for live execution.

/// Order identifiers, styles and lifecycle states.
pub mod order;

/// Fill records produced by matching.
pub mod trade;

/// Single-security holding with T+1 closeable tracking and cost basis.
pub mod position;

/// Cash ledger and positions map with the total-value identity.
pub mod portfolio;

/// Slippage, price cage, protect price and fee arithmetic.
pub mod pricing;

/// Bar-synchronous order matching.
pub mod matching;

/// Broker adapter interface and the simulator implementation.
pub mod client;

/// Defines all possible errors in Pagoda-Execution.
pub mod error;
