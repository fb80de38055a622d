//! Wire logging
//!
//! Line-oriented diagnostic output for outgoing frames. The [`LogSink`] is a
//! fire-and-forget side channel: nothing it does (or fails to do) affects
//! the connection.

use tracing::info;

use crate::errors::SerializerError;
use crate::serializer::MessageSerializer;
use crate::session_url::SessionUrl;

/// Prefix of every outgoing wire line
pub const OUTGOING_PREFIX: &str = "==> ";

/// Tracing target used by [`TracingLogSink`]
pub const WIRE_TARGET: &str = "relaylink::wire";

// ----------------------------------------------------------------------------
// Log Sinks
// ----------------------------------------------------------------------------

/// Accepts line-oriented log strings
pub trait LogSink: Send + Sync {
    fn log(&self, line: &str);
}

/// Sink forwarding lines to `tracing` at INFO level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, line: &str) {
        info!(target: WIRE_TARGET, "{}", line);
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogSink;

impl LogSink for NoOpLogSink {
    fn log(&self, _line: &str) {}
}

// ----------------------------------------------------------------------------
// Outgoing Frame Description
// ----------------------------------------------------------------------------

type DecodeAttempt<'a> = &'a dyn Fn() -> Result<String, SerializerError>;

/// First attempt that decodes, in order; failures are discarded
fn first_decoded(attempts: &[DecodeAttempt<'_>]) -> Option<String> {
    attempts.iter().find_map(|attempt| attempt().ok())
}

/// Render an outgoing payload for the wire log
///
/// Tries the payload as a JSON-RPC request, then as a response, and falls
/// back to the raw text when neither decodes.
pub fn describe_outgoing(
    text: &str,
    url: &SessionUrl,
    serializer: &dyn MessageSerializer,
) -> String {
    let as_request = || -> Result<String, SerializerError> {
        serializer.deserialize_request(text, url)?.to_json_string()
    };
    let as_response = || -> Result<String, SerializerError> {
        serializer.deserialize_response(text, url)?.to_json_string()
    };

    let body = first_decoded(&[&as_request, &as_response]).unwrap_or_else(|| text.to_string());
    format!("{}{}", OUTGOING_PREFIX, body)
}

/// Wire line announcing a heartbeat ping
pub fn heartbeat_line() -> String {
    format!("{}ping", OUTGOING_PREFIX)
}
