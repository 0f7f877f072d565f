//! Configuration documents for dispatchers and tickers
//!
//! Produced by `config_loader`, consumed by `Dispatcher::from_config` and
//! `PeriodicTicker::from_config`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::FailurePolicy;

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatcherConfig {
    /// Event name stamped on every packet
    #[validate(length(min = 1, message = "event name must not be empty"))]
    pub event: String,

    /// Callback failure policy
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Default packet fields (`dest`, `payload`, `cookie` or extra keys)
    #[serde(default)]
    pub template: Map<String, Value>,
}

impl DispatcherConfig {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            failure_policy: FailurePolicy::default(),
            template: Map::new(),
        }
    }
}

/// Periodic ticker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TickerConfig {
    /// Seconds between ticks; zero means back-to-back ticks
    #[validate(range(min = 0.0, message = "interval must be a non-negative number"))]
    pub interval_secs: f64,

    /// Event name; defaults to `"{interval}sRepeatingTimer"`
    #[serde(default)]
    pub name: Option<String>,

    /// Callback failure policy
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Default packet fields
    #[serde(default)]
    pub template: Map<String, Value>,
}

impl TickerConfig {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval_secs,
            name: None,
            failure_policy: FailurePolicy::default(),
            template: Map::new(),
        }
    }

    /// Event name the ticker will post under
    pub fn event_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| default_ticker_name(self.interval_secs))
    }
}

/// Name of a ticker created without one, e.g. `"1.0sRepeatingTimer"`
///
/// The interval keeps its fractional part even when it is whole.
pub fn default_ticker_name(interval_secs: f64) -> String {
    format!("{interval_secs:?}sRepeatingTimer")
}
