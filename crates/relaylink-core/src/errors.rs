//! Error types for relaylink
//!
//! One enum per concern (transport, session URL, serializer, configuration),
//! unified by [`RelayError`] at the crate root.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Errors reported by a transport through [`crate::TransportEvent::Error`]
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("WebSocket protocol error: {reason}")]
    Protocol { reason: String },

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed: {reason}")]
    Closed { reason: String },
}

// ----------------------------------------------------------------------------
// Session URL Errors
// ----------------------------------------------------------------------------

/// Errors produced while parsing a session URL
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionUrlError {
    #[error("Invalid session URL: {0}")]
    InvalidFormat(String),

    #[error("Session URL has no topic")]
    MissingTopic,

    #[error("Session URL has no protocol version")]
    MissingVersion,

    #[error("Session URL is missing the `{0}` parameter")]
    MissingParameter(&'static str),

    #[error("Invalid bridge URL {url}: {reason}")]
    InvalidBridge { url: String, reason: String },

    #[error("Unsupported bridge scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid session key: {0}")]
    InvalidKey(String),
}

// ----------------------------------------------------------------------------
// Serializer Errors
// ----------------------------------------------------------------------------

/// Errors produced while decoding a payload as JSON-RPC
#[derive(Debug, Error)]
pub enum SerializerError {
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload for topic {topic} is encrypted")]
    EncryptedPayload { topic: String },

    #[error("Unsupported JSON-RPC version: {0}")]
    UnsupportedVersion(String),

    #[error("Malformed JSON-RPC message: {0}")]
    Malformed(String),
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors produced by configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,
}
