//! Ready-made subscriber and error sink that log via tracing

use std::sync::Arc;

use contracts::{CallbackFailure, ErrorSink, EventCallback, EventPacket};
use tracing::{error, info};

/// Subscriber that logs a summary of every packet it receives
#[derive(Debug, Clone)]
pub struct LogSubscriber {
    name: String,
}

impl LogSubscriber {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn log_packet(&self, packet: &EventPacket) {
        info!(
            subscriber = %self.name,
            event = %packet.event,
            dest = ?packet.dest,
            payload = %packet.payload,
            cookie = ?packet.cookie,
            extra_fields = packet.extra.len(),
            "Event received"
        );
    }

    /// Convert into a callback for `Dispatcher::subscribe`
    pub fn into_callback(self) -> EventCallback {
        Arc::new(move |packet: &EventPacket| {
            self.log_packet(packet);
            Ok(())
        })
    }
}

/// Error sink that logs every callback failure at error level
pub fn log_error_sink() -> ErrorSink {
    Arc::new(|failure: &CallbackFailure| {
        error!(
            event = %failure.event,
            subscriber = %failure.subscriber,
            panicked = failure.panicked,
            error = %failure.message,
            "Subscriber callback failed"
        );
    })
}
