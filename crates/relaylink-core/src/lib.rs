//! relaylink core
//!
//! Manages one persistent text-message connection to a relay bridge identified
//! by a session URL. The [`Connection`] tracks open/closed state, keeps the
//! socket alive with a periodic ping, delivers every transport event on a
//! single ordered task, and logs outgoing frames in a JSON-RPC aware way.
//!
//! The transport, the JSON-RPC serializer and the log sink sit behind narrow
//! traits ([`Transport`], [`MessageSerializer`], [`LogSink`]) with default
//! implementations provided here.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod connection;
pub mod errors;
pub mod heartbeat;
pub mod serializer;
pub mod session_url;
pub mod transport;
pub mod wire_log;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionBuilder, ConnectionCallbacks, ConnectionState};
pub use errors::{ConfigError, SerializerError, SessionUrlError, TransportError};
pub use serializer::{
    JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, JsonRpcSerializer, MessageSerializer,
    RequestId,
};
pub use session_url::SessionUrl;
pub use transport::{event_channel, EventReceiver, EventSender, Transport, TransportEvent};
pub use wire_log::{describe_outgoing, LogSink, NoOpLogSink, TracingLogSink};

#[cfg(feature = "websocket")]
pub use transport::websocket::WebSocketTransport;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Top-level error type for relaylink
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session URL error: {0}")]
    SessionUrl(#[from] SessionUrlError),

    #[error("Serializer error: {0}")]
    Serializer(#[from] SerializerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tokio runtime unavailable: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

pub type Result<T> = core::result::Result<T, RelayError>;
