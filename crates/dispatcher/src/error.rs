//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Post after `stop()`
    #[error("dispatcher for event '{event}' is stopped")]
    Stopped { event: String },

    /// Worker exited after a fail-fast callback failure
    #[error("dispatch worker for event '{event}' terminated after a callback failure")]
    WorkerTerminated { event: String },

    /// Worker thread could not be spawned
    #[error("failed to spawn dispatch worker for event '{event}': {source}")]
    Spawn {
        event: String,
        #[source]
        source: std::io::Error,
    },
}

impl DispatcherError {
    pub fn stopped(event: impl Into<String>) -> Self {
        Self::Stopped {
            event: event.into(),
        }
    }

    pub fn worker_terminated(event: impl Into<String>) -> Self {
        Self::WorkerTerminated {
            event: event.into(),
        }
    }
}
