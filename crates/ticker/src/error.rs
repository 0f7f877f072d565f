//! Ticker error types

use dispatcher::DispatcherError;
use thiserror::Error;

/// Ticker-specific errors
#[derive(Debug, Error)]
pub enum TickerError {
    /// Rejected constructor argument
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Underlying dispatcher error
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    /// Timer thread could not be spawned
    #[error("failed to spawn timer thread for '{timer}': {source}")]
    Spawn {
        timer: String,
        #[source]
        source: std::io::Error,
    },
}

impl TickerError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
