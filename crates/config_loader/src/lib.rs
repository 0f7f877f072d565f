//! # Config Loader
//!
//! Configuration loading for dispatchers and tickers.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce `DispatcherConfig` / `TickerConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_ticker(Path::new("ticker.toml")).unwrap();
//! println!("Interval: {}s", config.interval_secs);
//! ```

mod parser;
mod validation;

pub use contracts::{DispatcherConfig, TickerConfig};
pub use parser::ConfigFormat;
pub use validation::ConfigDocument;

use contracts::EventError;
use serde::Serialize;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a dispatcher configuration from a file
    pub fn load_dispatcher(path: &Path) -> Result<DispatcherConfig, EventError> {
        Self::load_from_path(path)
    }

    /// Load a ticker configuration from a file
    pub fn load_ticker(path: &Path) -> Result<TickerConfig, EventError> {
        Self::load_from_path(path)
    }

    /// Load any configuration document from a file
    ///
    /// Format is detected from the extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path<T: ConfigDocument>(path: &Path) -> Result<T, EventError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load a configuration document from a string
    pub fn load_from_str<T: ConfigDocument>(
        content: &str,
        format: ConfigFormat,
    ) -> Result<T, EventError> {
        let config = parser::parse(content, format)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Serialize a configuration to TOML
    pub fn to_toml<T: Serialize>(config: &T) -> Result<String, EventError> {
        toml::to_string_pretty(config)
            .map_err(|e| EventError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize a configuration to JSON
    pub fn to_json<T: Serialize>(config: &T) -> Result<String, EventError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| EventError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    fn detect_format(path: &Path) -> Result<ConfigFormat, EventError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            EventError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext)
            .ok_or_else(|| EventError::config_parse(format!("unsupported config format: .{ext}")))
    }

    fn read_file(path: &Path) -> Result<String, EventError> {
        Ok(std::fs::read_to_string(path)?)
    }
}
