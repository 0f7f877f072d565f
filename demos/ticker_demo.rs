//! Ticker Demo
//!
//! Prints the current time every half second for three seconds. An
//! optional first argument names a ticker config file (.toml / .json).
//!
//! Run with: cargo run --bin ticker_demo [-- ticker.toml]

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::TickerConfig;
use dispatcher::callback;
use observability::{LogFormat, ObservabilityConfig};
use ticker::PeriodicTicker;

fn main() -> Result<()> {
    observability::init_with_config(ObservabilityConfig {
        log_format: LogFormat::Pretty,
        ..Default::default()
    })?;

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Loading ticker config");
            ConfigLoader::load_ticker(Path::new(&path))
                .with_context(|| format!("Failed to load {path}"))?
        }
        None => TickerConfig::new(0.5),
    };

    let ticker = PeriodicTicker::from_config(&config).context("Failed to start ticker")?;
    ticker.subscribe(
        "time_printer",
        callback(|packet| println!("Current time: {}", packet.payload)),
        None,
    );

    thread::sleep(Duration::from_secs(3));

    ticker.unsubscribe("time_printer");
    let drift = ticker.drift_summary();
    ticker.stop();

    tracing::info!(drift_ms = %drift, "Ticker demo finished");
    Ok(())
}
