//! Bucketing engine - assigns trades to time buckets and closes candles
//!
//! A bucket is finalized exactly once, when the first trade of a newer
//! bucket arrives. The in-progress accumulator is rotated before the
//! candle is handed out, so re-finalizing a closed bucket has no code
//! path that could reach it.

use tracing::warn;

use crate::error::AggregationError;
use crate::types::{bucket_id, BucketId, Candle, Trade};

pub struct BucketEngine {
    bucket_size_ms: i64,
    current: Option<BucketId>,
    /// Trades of the current bucket, in arrival order.
    trades: Vec<Trade>,
}

impl BucketEngine {
    pub fn new(bucket_size_ms: i64) -> Self {
        debug_assert!(bucket_size_ms > 0);
        Self {
            bucket_size_ms,
            current: None,
            trades: Vec::new(),
        }
    }

    /// Feed one trade into the engine.
    ///
    /// Returns the finalized candle when this trade opens a newer bucket,
    /// `None` otherwise. Trades timestamped before the current bucket are
    /// folded into it unchanged; the single `>` comparison below is the
    /// only place that policy lives.
    pub fn apply(&mut self, trade: Trade) -> Option<Candle> {
        let new_id = bucket_id(trade.trade_time_ms, self.bucket_size_ms);
        match self.current {
            None => {
                self.current = Some(new_id);
                self.trades.push(trade);
                None
            }
            Some(current) if new_id > current => self.rotate(current, new_id, trade),
            Some(_) => {
                self.trades.push(trade);
                None
            }
        }
    }

    /// Bucket currently accumulating, if any trade has been seen.
    pub fn current_bucket(&self) -> Option<BucketId> {
        self.current
    }

    /// Number of trades accumulated in the current bucket.
    pub fn pending_trades(&self) -> usize {
        self.trades.len()
    }

    /// Close `closed` and open `new_id` seeded with `trade`.
    ///
    /// State is reset before finalization runs: a finalization fault drops
    /// the closed bucket but never disturbs the bucket already rotated in.
    fn rotate(&mut self, closed: BucketId, new_id: BucketId, trade: Trade) -> Option<Candle> {
        let closed_trades = std::mem::replace(&mut self.trades, vec![trade]);
        self.current = Some(new_id);

        match finalize(closed, &closed_trades, self.bucket_size_ms) {
            Ok(candle) => Some(candle),
            Err(e) => {
                warn!(bucket = closed, error = %e, "Dropping bucket: finalization failed");
                None
            }
        }
    }
}

/// Compute the candle for one closed bucket.
fn finalize(
    id: BucketId,
    trades: &[Trade],
    bucket_size_ms: i64,
) -> Result<Candle, AggregationError> {
    let last = trades.last().ok_or(AggregationError::EmptyBucket(id))?;

    let mut min = last.price;
    let mut max = last.price;
    let mut tick_buy = 0u64;
    let mut tick_sell = 0u64;
    let mut volume_buy = 0.0f64;
    let mut volume_sell = 0.0f64;

    for trade in trades {
        min = min.min(trade.price);
        max = max.max(trade.price);
        if trade.is_maker {
            tick_sell += 1;
            volume_sell += trade.quantity;
        } else {
            tick_buy += 1;
            volume_buy += trade.quantity;
        }
    }

    let range = max - min;
    let price = last.price;
    let price_close = if range == 0.0 {
        -1.0
    } else {
        (price - min) / range
    };

    Ok(Candle {
        bucket_id: id,
        price,
        price_close,
        range,
        tick_buy,
        tick_sell,
        volume_buy,
        volume_sell,
        time_ms: id * bucket_size_ms,
    })
}
