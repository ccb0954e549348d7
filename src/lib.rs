//! Tapecandle Library
//!
//! Groups a live aggregate-trade stream into fixed-duration buy/sell
//! imbalance candles and keeps the feed subscription alive with a
//! liveness watchdog.

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod runtime;
pub mod types;
pub mod ui;
pub mod watchdog;
