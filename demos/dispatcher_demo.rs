//! Dispatcher Demo
//!
//! Subscribes a printer, posts, unsubscribes, posts again, then stops.
//!
//! Run with: cargo run --bin dispatcher_demo

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use dispatcher::{callback, log_error_sink, Dispatcher, LogSubscriber};
use observability::{LogFormat, ObservabilityConfig};

fn main() -> Result<()> {
    observability::init_with_config(ObservabilityConfig {
        log_format: LogFormat::Compact,
        ..Default::default()
    })?;

    let events = Dispatcher::builder("example")
        .error_sink(log_error_sink())
        .build()
        .context("Failed to start dispatcher")?;

    events
        .subscribe(
            "example_subscriber",
            callback(|packet| println!("{}", packet.payload)),
            None,
        )
        .subscribe("audit", LogSubscriber::new("audit").into_callback(), None);

    events.post("Hello, world!")?;
    // Delivery is asynchronous; give the worker a moment before unsubscribing.
    thread::sleep(Duration::from_millis(100));

    events.unsubscribe("example_subscriber");
    events.post("This won't be printed")?;
    thread::sleep(Duration::from_millis(100));

    let metrics = events.metrics();
    tracing::info!(
        posted = metrics.posted,
        delivered = metrics.delivered,
        "Dispatcher demo finished"
    );
    events.stop();
    Ok(())
}
