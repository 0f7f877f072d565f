//! # Dispatcher
//!
//! Threaded event dispatch.
//!
//! Responsibilities:
//! - Accept posts from any thread without blocking
//! - Deliver each packet, in post order, to every subscriber registered
//!   at delivery time
//! - Run subscriber callbacks on one dedicated worker thread per dispatcher
//!
//! # Example
//!
//! ```no_run
//! use dispatcher::{callback, Dispatcher};
//!
//! let events = Dispatcher::new("example").unwrap();
//! events.subscribe("printer", callback(|packet| println!("{}", packet.payload)), None);
//! events.post("Hello, world!").unwrap();
//! events.stop();
//! ```

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod sinks;
mod worker;

pub use contracts::{
    callback, callback_identity, fallible_callback, CallbackFailure, ErrorSink, EventCallback,
    EventPacket, FailurePolicy, Subscriber, SubscriberDescriptor, SubscriberRef, SubscriberSpec,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder, DispatcherState};
pub use error::DispatcherError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use registry::SubscriberRegistry;
pub use sinks::{log_error_sink, LogSubscriber};
