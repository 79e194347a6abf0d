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

//! # Pagoda-Instrument
//! Pagoda-Instrument contains core Security, Exchange and trading-session data structures,
//! together with the per-instrument trading rules (lot sizes, tick brackets) the matching
//! engine applies.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Defines the [`Exchange`](exchange::Exchange) taxonomy for mainland listings.
pub mod exchange;

/// [`Security`](security::Security) identifiers and instrument classification.
pub mod security;

/// Per-instrument lot rules and order-amount rounding.
pub mod lot;

/// Tick-size brackets and directional price rounding.
pub mod tick;

/// Market session periods and session-relative time arithmetic.
pub mod calendar;

/// Defines all possible errors in Pagoda-Instrument.
pub mod error;

/// [`Side`] of a market or order; Buy or Sell.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl Side {
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}
