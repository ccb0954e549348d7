//! Aggregation engine - groups the trade tape into imbalance candles
//!
//! Consumes the totally ordered trade stream, buckets trades by time,
//! finalizes each bucket into a [`crate::types::Candle`] exactly once, and
//! maintains the bounded history window and the price alert.

mod alert;
mod bucket;
mod history;

pub use alert::{AlertEvaluator, AlertFired};
pub use bucket::BucketEngine;
pub use history::RollingHistory;
