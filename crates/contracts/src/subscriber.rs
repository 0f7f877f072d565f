//! Subscriber contracts
//!
//! A subscriber is a named (callback, cookie) pair. Callers register one
//! either by name, by bare callback, or through a descriptor; removal
//! accepts the same shapes.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::EventPacket;

/// Error returned from a failing subscriber callback
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of subscriber callbacks
pub type CallbackResult = Result<(), CallbackError>;

/// Subscriber callback type
///
/// Invoked on the dispatch worker thread, once per delivered packet.
pub type EventCallback = Arc<dyn Fn(&EventPacket) -> CallbackResult + Send + Sync>;

/// Wrap an infallible closure as an [`EventCallback`]
pub fn callback<F>(f: F) -> EventCallback
where
    F: Fn(&EventPacket) + Send + Sync + 'static,
{
    Arc::new(move |packet: &EventPacket| {
        f(packet);
        Ok(())
    })
}

/// Wrap a fallible closure as an [`EventCallback`]
pub fn fallible_callback<F>(f: F) -> EventCallback
where
    F: Fn(&EventPacket) -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Name derived from a callback's identity
///
/// Two clones of the same `Arc` share an identity, so a callback
/// registered without a name can later be removed by passing it again.
pub fn callback_identity(callback: &EventCallback) -> String {
    format!("callback@{:p}", Arc::as_ptr(callback))
}

/// Registered subscriber entry
#[derive(Clone)]
pub struct Subscriber {
    pub name: String,
    pub callback: EventCallback,
    pub cookie: Option<Value>,
}

impl Subscriber {
    pub fn new(name: impl Into<String>, callback: EventCallback, cookie: Option<Value>) -> Self {
        Self {
            name: name.into(),
            callback,
            cookie,
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.name)
            .field("callback", &callback_identity(&self.callback))
            .field("cookie", &self.cookie)
            .finish()
    }
}

/// Loose subscriber description
///
/// Every field is optional: a descriptor without a callback describes
/// nothing that can be registered.
#[derive(Clone, Default)]
pub struct SubscriberDescriptor {
    pub name: Option<String>,
    pub callback: Option<EventCallback>,
    pub cookie: Option<Value>,
}

impl SubscriberDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn cookie(mut self, cookie: Value) -> Self {
        self.cookie = Some(cookie);
        self
    }

    /// Resolved subscriber name: explicit name, else callback identity
    pub fn resolved_name(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.callback.as_ref().map(callback_identity))
    }
}

impl fmt::Debug for SubscriberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberDescriptor")
            .field("name", &self.name)
            .field("callback", &self.callback.as_ref().map(callback_identity))
            .field("cookie", &self.cookie)
            .finish()
    }
}

/// What to register via `add_subscriber`
#[derive(Clone)]
pub enum SubscriberSpec {
    /// Bare callback, registered under its identity name
    ByCallback(EventCallback),
    /// Descriptor with optional name and cookie
    ByDescriptor(SubscriberDescriptor),
}

impl SubscriberSpec {
    /// Resolve into a registrable subscriber
    ///
    /// Returns `None` for a descriptor lacking a callback.
    pub fn into_subscriber(self) -> Option<Subscriber> {
        match self {
            Self::ByCallback(callback) => {
                let name = callback_identity(&callback);
                Some(Subscriber::new(name, callback, None))
            }
            Self::ByDescriptor(descriptor) => {
                let name = descriptor.resolved_name()?;
                let callback = descriptor.callback?;
                Some(Subscriber::new(name, callback, descriptor.cookie))
            }
        }
    }
}

impl fmt::Debug for SubscriberSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByCallback(callback) => f
                .debug_tuple("ByCallback")
                .field(&callback_identity(callback))
                .finish(),
            Self::ByDescriptor(descriptor) => {
                f.debug_tuple("ByDescriptor").field(descriptor).finish()
            }
        }
    }
}

impl From<EventCallback> for SubscriberSpec {
    fn from(callback: EventCallback) -> Self {
        Self::ByCallback(callback)
    }
}

impl From<SubscriberDescriptor> for SubscriberSpec {
    fn from(descriptor: SubscriberDescriptor) -> Self {
        Self::ByDescriptor(descriptor)
    }
}

/// What to remove via `remove_subscriber`
#[derive(Clone)]
pub enum SubscriberRef {
    Name(String),
    ByCallback(EventCallback),
    ByDescriptor(SubscriberDescriptor),
}

impl SubscriberRef {
    /// Registry key this reference points at, if any
    pub fn resolved_name(&self) -> Option<String> {
        match self {
            Self::Name(name) => Some(name.clone()),
            Self::ByCallback(callback) => Some(callback_identity(callback)),
            Self::ByDescriptor(descriptor) => descriptor.resolved_name(),
        }
    }
}

impl fmt::Debug for SubscriberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::ByCallback(callback) => f
                .debug_tuple("ByCallback")
                .field(&callback_identity(callback))
                .finish(),
            Self::ByDescriptor(descriptor) => {
                f.debug_tuple("ByDescriptor").field(descriptor).finish()
            }
        }
    }
}

impl From<&str> for SubscriberRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for SubscriberRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<EventCallback> for SubscriberRef {
    fn from(callback: EventCallback) -> Self {
        Self::ByCallback(callback)
    }
}

impl From<SubscriberDescriptor> for SubscriberRef {
    fn from(descriptor: SubscriberDescriptor) -> Self {
        Self::ByDescriptor(descriptor)
    }
}
