//! Configuration management for tapecandle
//!
//! Loads defaults, then optional config files, then environment variables
//! via .env. The thin CLI layer may override the symbol and candle size
//! afterwards; `validate` runs once everything is merged.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub candle: CandleConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// WebSocket endpoint of the futures market-data feed
    pub endpoint: String,
    /// Target symbol, e.g. "btcusdt" (required)
    pub symbol: String,
    /// Period of the LIST_SUBSCRIPTIONS liveness probe in milliseconds
    pub probe_interval_ms: u64,
    /// Maximum feed silence before a forced reconnect in milliseconds
    pub watchdog_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandleConfig {
    /// Candle size in seconds
    pub size_secs: u64,
    /// Number of finalized candles kept for the chart window
    pub history_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    /// Snapshot publish period in milliseconds
    pub redraw_interval_ms: u64,
    /// Number of log lines kept for the scrolling event log
    pub log_capacity: usize,
}

impl FeedConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }
}

impl CandleConfig {
    pub fn size_ms(&self) -> i64 {
        self.size_secs as i64 * 1000
    }
}

impl UiConfig {
    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from defaults, files and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Feed defaults
            .set_default("feed.endpoint", "wss://fstream.binance.com/ws")?
            .set_default("feed.symbol", "")?
            .set_default("feed.probe_interval_ms", 25_000)?
            .set_default("feed.watchdog_timeout_ms", 60_000)?
            // Candle defaults
            .set_default("candle.size_secs", 60)?
            .set_default("candle.history_len", 100)?
            // UI defaults
            .set_default("ui.redraw_interval_ms", 50)?
            .set_default("ui.log_capacity", 100)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (TAPECANDLE_*)
            .add_source(Environment::with_prefix("TAPECANDLE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Check the merged configuration before the runtime starts
    pub fn validate(&self) -> Result<()> {
        if self.feed.symbol.trim().is_empty() {
            bail!("target symbol is required (positional argument or TAPECANDLE_FEED__SYMBOL)");
        }
        if self.feed.endpoint.is_empty() {
            bail!("feed.endpoint must not be empty");
        }
        if self.candle.size_secs == 0 {
            bail!("candle.size_secs must be a positive number of seconds");
        }
        if self.candle.history_len == 0 {
            bail!("candle.history_len must be positive");
        }
        if self.feed.probe_interval_ms == 0 || self.feed.watchdog_timeout_ms == 0 {
            bail!("feed probe and watchdog periods must be positive");
        }
        if self.ui.redraw_interval_ms == 0 || self.ui.log_capacity == 0 {
            bail!("ui redraw period and log capacity must be positive");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "symbol={} size={}s history={} watchdog={}ms probe={}ms",
            self.feed.symbol,
            self.candle.size_secs,
            self.candle.history_len,
            self.feed.watchdog_timeout_ms,
            self.feed.probe_interval_ms
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
