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

//! # Pagoda-Data
//! Pagoda-Data defines the market-data seam the Pagoda engine depends on: the
//! [`DataProvider`](provider::DataProvider) interface, normalised [`Bar`](bar::Bar) records,
//! corporate-action records, and a deterministic in-memory provider for simulations and tests.
//!
//! Concrete remote providers (credentialing, caching, wire formats) are external collaborators
//! and out of scope here.

/// Normalised OHLCV bar and live snapshot records.
pub mod bar;

/// Price query parameters shared by all providers.
pub mod request;

/// Cash dividend and share split/bonus records.
pub mod action;

/// The [`DataProvider`](provider::DataProvider) interface.
pub mod provider;

/// Deterministic in-memory [`DataProvider`](provider::DataProvider) implementation.
pub mod stub;

/// Defines all possible errors in Pagoda-Data.
pub mod error;
