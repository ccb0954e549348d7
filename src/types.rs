//! Core types used throughout tapecandle
//!
//! Defines the trade and candle data structures shared by the feed,
//! the aggregation engine, and the presentation projections.

use std::fmt;

/// Identifier of one fixed-duration time bucket.
///
/// Strictly increasing over the trade stream as long as the feed delivers
/// trades in non-decreasing time order.
pub type BucketId = i64;

/// Compute the bucket a trade timestamp falls into.
pub fn bucket_id(trade_time_ms: i64, bucket_size_ms: i64) -> BucketId {
    trade_time_ms.div_euclid(bucket_size_ms)
}

/// One aggregate trade from the feed. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    /// True when the buyer was the market maker (passive side).
    pub is_maker: bool,
    pub price: f64,
    pub quantity: f64,
    /// Trade timestamp, epoch milliseconds.
    pub trade_time_ms: i64,
}

/// Summary statistics for one finalized bucket.
///
/// Created exactly once per bucket at rollover and never mutated afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub bucket_id: BucketId,
    /// Close price of the bucket (last trade's price).
    pub price: f64,
    /// Where the close sits inside the bucket's price range, in `[0, 1]`.
    /// Exactly `-1.0` when every trade printed at the same price; callers
    /// must treat that as "undefined", not "0%".
    pub price_close: f64,
    /// `max - min` over the bucket's trade prices.
    pub range: f64,
    pub tick_buy: u64,
    pub tick_sell: u64,
    pub volume_buy: f64,
    pub volume_sell: f64,
    /// Bucket start, epoch milliseconds (`bucket_id * bucket_size_ms`).
    pub time_ms: i64,
}

impl Candle {
    /// Total number of trades in the bucket.
    pub fn ticks(&self) -> u64 {
        self.tick_buy + self.tick_sell
    }

    /// Average buy volume per buy tick. `None` when no buy ticks printed.
    pub fn volume_per_tick_buy(&self) -> Option<f64> {
        if self.tick_buy == 0 {
            None
        } else {
            Some(self.volume_buy / self.tick_buy as f64)
        }
    }

    /// Average sell volume per sell tick. `None` when no sell ticks printed.
    pub fn volume_per_tick_sell(&self) -> Option<f64> {
        if self.tick_sell == 0 {
            None
        } else {
            Some(self.volume_sell / self.tick_sell as f64)
        }
    }

    /// Per-tick volume imbalance scaled by tick count. `None` when either
    /// side has zero ticks.
    pub fn polarized_volume(&self) -> Option<f64> {
        let buy = self.volume_per_tick_buy()?;
        let sell = self.volume_per_tick_sell()?;
        Some((buy - sell) * self.ticks() as f64)
    }
}

/// Direction of the last observed price move, used by the presentation
/// layer for coloring. A trade at an unchanged price keeps the previous
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceDirection {
    Up,
    Down,
    #[default]
    Flat,
}

impl PriceDirection {
    /// Direction of `price` relative to `prev`, keeping `self` on a tie.
    pub fn advance(self, prev: Option<f64>, price: f64) -> Self {
        match prev {
            Some(p) if price > p => PriceDirection::Up,
            Some(p) if price < p => PriceDirection::Down,
            _ => self,
        }
    }
}

impl fmt::Display for PriceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceDirection::Up => write!(f, "up"),
            PriceDirection::Down => write!(f, "down"),
            PriceDirection::Flat => write!(f, "flat"),
        }
    }
}
