//! Error taxonomy for the feed and aggregation pipeline
//!
//! None of these are fatal to the process: transport failures are retried
//! by the watchdog, malformed messages are dropped, and aggregation faults
//! drop a single bucket. Everything surfaces as a timestamped log line.

use thiserror::Error;

use crate::types::BucketId;

/// Transport-level failure on the feed connection.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket connect failed: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("websocket send failed: {0}")]
    Send(#[source] tokio_tungstenite::tungstenite::Error),
}

/// An inbound payload that could not be understood.
///
/// The offending message is dropped and the stream continues.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a json object")]
    NotAnObject,

    #[error("invalid number in field `{0}`")]
    Number(&'static str),
}

/// Fault while finalizing a bucket into a candle.
///
/// The bucket is dropped; bucketing continues with the bucket that was
/// already rotated in.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("bucket {0} reached finalization with no trades")]
    EmptyBucket(BucketId),
}
