//! EventPacket - the record delivered to subscribers
//!
//! A packet is built from the dispatcher's template on every post. The
//! dispatch loop then derives one addressed copy per subscriber, so a
//! callback owns a value nobody else mutates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Packet delivered to a subscriber callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPacket {
    /// Event name
    pub event: String,

    /// Destination subscriber name (set at delivery time)
    #[serde(default)]
    pub dest: Option<String>,

    /// Posted payload
    #[serde(default)]
    pub payload: Value,

    /// Subscriber cookie (set at delivery time)
    #[serde(default)]
    pub cookie: Option<Value>,

    /// Additional template / override fields
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl EventPacket {
    /// Create an empty packet for the given event name
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            dest: None,
            payload: Value::Null,
            cookie: None,
            extra: BTreeMap::new(),
        }
    }

    /// Build a template from a field map
    ///
    /// `dest`, `payload` and `cookie` seed the corresponding fields; every
    /// other key except `event` is kept in `extra`.
    pub fn template(event: impl Into<String>, fields: &Map<String, Value>) -> Self {
        let mut packet = Self::new(event);
        for (key, value) in fields {
            match key.as_str() {
                "event" => {}
                "dest" => packet.dest = value.as_str().map(str::to_string),
                "payload" => packet.payload = value.clone(),
                "cookie" => packet.cookie = Some(value.clone()).filter(|v| !v.is_null()),
                _ => {
                    packet.extra.insert(key.clone(), value.clone());
                }
            }
        }
        packet
    }

    /// Apply per-post overrides
    ///
    /// A string `event` renames the packet; `dest`, `cookie` and `payload`
    /// are owned by the delivery loop and the post call and are skipped.
    pub fn apply_overrides(&mut self, overrides: &Map<String, Value>) {
        for (key, value) in overrides {
            match key.as_str() {
                "event" => {
                    if let Some(name) = value.as_str() {
                        self.event = name.to_string();
                    }
                }
                "dest" | "cookie" | "payload" => {}
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Copy of this packet addressed to one subscriber
    pub fn addressed_to(&self, dest: &str, cookie: Option<&Value>) -> Self {
        Self {
            dest: Some(dest.to_string()),
            cookie: cookie.cloned(),
            ..self.clone()
        }
    }

    /// Look up an extra field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
