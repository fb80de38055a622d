//! relaylink CLI configuration
//!
//! Loaded from an optional TOML file:
//!
//! ```toml
//! [connection]
//! heartbeat_interval_secs = 30
//!
//! [logging]
//! verbose = false
//! ```
//!
//! Missing sections and keys fall back to defaults. Command-line flags take
//! precedence over anything read from the file.

use std::path::Path;
use std::time::Duration;

use relaylink_core::ConnectionConfig;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the relaylink CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionSection,
    pub logging: LoggingSection,
}

/// `[connection]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Seconds between keepalive pings
    pub heartbeat_interval_secs: u64,
}

/// `[logging]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Enable debug-level logging
    pub verbose: bool,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: ConnectionConfig::default().heartbeat_interval.as_secs(),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::FileSystem(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|e| ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e)))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Loading(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection configuration, with an optional heartbeat override in seconds
    ///
    /// `fast` selects the 5 second preset and wins over both the file and the override.
    pub fn connection_config(&self, heartbeat_override: Option<u64>, fast: bool) -> ConnectionConfig {
        if fast {
            return ConnectionConfig::fast_heartbeat();
        }
        let secs = heartbeat_override.unwrap_or(self.connection.heartbeat_interval_secs);
        ConnectionConfig::with_heartbeat_interval(Duration::from_secs(secs))
    }

    /// Example configuration file contents
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
