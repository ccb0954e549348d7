use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use tapecandle::config::AppConfig;
use tapecandle::runtime::Runtime;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = AppConfig::load()?;

    // Positional overrides from the thin CLI layer: symbol, then candle
    // size in seconds.
    let mut args = std::env::args().skip(1);
    if let Some(symbol) = args.next() {
        cfg.feed.symbol = symbol;
    }
    if let Some(size) = args.next() {
        cfg.candle.size_secs = size
            .parse()
            .context("candle size must be a positive integer of seconds")?;
    }
    cfg.validate()?;

    tracing::info!(config = %cfg.digest(), "Starting tapecandle");

    let (runtime, handles) = Runtime::new(cfg);
    // The terminal renderer and notification player attach to these
    // handles; without them the runtime runs headless and logs to stderr.
    let _handles = handles;
    runtime.run().await
}
