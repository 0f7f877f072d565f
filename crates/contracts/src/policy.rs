//! Callback failure policy
//!
//! Decides what the dispatch worker does when a subscriber callback
//! returns an error or panics.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Failure handling policy for subscriber callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failure aborts the current delivery and terminates the worker.
    /// Later posts are rejected.
    FailFast,
    /// Failures are logged and reported; delivery continues with the next
    /// subscriber.
    #[default]
    Isolate,
}

/// Report of one failed callback invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    /// Event name of the packet being delivered
    pub event: String,
    /// Subscriber whose callback failed
    pub subscriber: String,
    /// Error message or panic text
    pub message: String,
    /// Whether the callback panicked rather than returning an error
    pub panicked: bool,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(
            f,
            "subscriber '{}' {} on event '{}': {}",
            self.subscriber, kind, self.event, self.message
        )
    }
}

/// Side channel receiving isolated callback failures
pub type ErrorSink = Arc<dyn Fn(&CallbackFailure) + Send + Sync>;
