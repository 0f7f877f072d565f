//! Config validation
//!
//! Rules:
//! - event name non-empty (derive)
//! - interval_secs >= 0 (derive), finite and representable as a `Duration`
//! - template `dest` is a string or null
//! - template must not carry an `event` key

use std::time::Duration;

use contracts::{DispatcherConfig, EventError, TickerConfig};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::Validate;

/// A configuration document the loader can produce
pub trait ConfigDocument: DeserializeOwned + Validate {
    /// Checks beyond the derived field rules
    fn validate_semantics(&self) -> Result<(), EventError>;
}

impl ConfigDocument for DispatcherConfig {
    fn validate_semantics(&self) -> Result<(), EventError> {
        validate_template(&self.template)
    }
}

impl ConfigDocument for TickerConfig {
    fn validate_semantics(&self) -> Result<(), EventError> {
        if Duration::try_from_secs_f64(self.interval_secs).is_err() {
            return Err(EventError::config_validation(
                "interval_secs",
                format!(
                    "interval must be a finite, representable duration, got {}",
                    self.interval_secs
                ),
            ));
        }
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(EventError::config_validation(
                    "name",
                    "name must not be empty when given",
                ));
            }
        }
        validate_template(&self.template)
    }
}

/// Validate a configuration document
///
/// Returns the first error encountered.
pub fn validate<T: ConfigDocument>(config: &T) -> Result<(), EventError> {
    config.validate()?;
    config.validate_semantics()
}

fn validate_template(template: &Map<String, Value>) -> Result<(), EventError> {
    if template.contains_key("event") {
        return Err(EventError::config_validation(
            "template.event",
            "event name is set by the dispatcher, not the template",
        ));
    }
    match template.get("dest") {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(EventError::config_validation(
            "template.dest",
            format!("dest must be a string, got {other}"),
        )),
    }
}
