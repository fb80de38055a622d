//! Error handling for the relaylink CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("relaylink error: {0}")]
    Relay(#[from] relaylink_core::RelayError),

    #[error("Session URL error: {0}")]
    SessionUrl(#[from] relaylink_core::SessionUrlError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection lost: {0}")]
    Disconnected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
