//! JSON-RPC message serializer
//!
//! Decodes outgoing text into JSON-RPC requests or responses so the wire log
//! can print them in canonical form. Nothing on the send path depends on a
//! decode succeeding.

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::errors::SerializerError;
use crate::session_url::SessionUrl;

/// Only JSON-RPC version accepted by the serializer
pub const JSONRPC_VERSION: &str = "2.0";

// ----------------------------------------------------------------------------
// JSON-RPC Types
// ----------------------------------------------------------------------------

/// JSON-RPC request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// JSON-RPC request (or notification when `id` is absent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error object carried by a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC response; exactly one of `result` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: RequestId,
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

/// Keeps an explicit `null` result distinct from a missing one
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    /// Render as compact JSON
    pub fn to_json_string(&self) -> Result<String, SerializerError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl JsonRpcResponse {
    /// Render as compact JSON
    pub fn to_json_string(&self) -> Result<String, SerializerError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ----------------------------------------------------------------------------
// Serializer Trait
// ----------------------------------------------------------------------------

/// Decodes raw socket text into JSON-RPC messages
pub trait MessageSerializer: Send + Sync {
    fn deserialize_request(
        &self,
        text: &str,
        url: &SessionUrl,
    ) -> Result<JsonRpcRequest, SerializerError>;

    fn deserialize_response(
        &self,
        text: &str,
        url: &SessionUrl,
    ) -> Result<JsonRpcResponse, SerializerError>;
}

// ----------------------------------------------------------------------------
// JSON-RPC Serializer
// ----------------------------------------------------------------------------

/// Bridge socket envelope wrapping a JSON-RPC payload
#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    topic: String,
    payload: String,
}

/// Encrypted payload shape; presence of all three fields is enough to detect it
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EncryptedPayload {
    data: String,
    hmac: String,
    iv: String,
}

/// Default serializer for bare JSON-RPC documents and bridge envelopes
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcSerializer;

impl JsonRpcSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Strip the bridge envelope, if any, leaving the JSON-RPC document
    fn unwrap_payload<'a>(
        &self,
        text: &'a str,
        url: &SessionUrl,
    ) -> Result<Cow<'a, str>, SerializerError> {
        let Ok(envelope) = serde_json::from_str::<SocketEnvelope>(text) else {
            return Ok(Cow::Borrowed(text));
        };

        if serde_json::from_str::<EncryptedPayload>(&envelope.payload).is_ok() {
            let topic = if envelope.topic.is_empty() {
                url.topic().to_string()
            } else {
                envelope.topic
            };
            return Err(SerializerError::EncryptedPayload { topic });
        }

        trace!(topic = %envelope.topic, "unwrapped bridge envelope");
        Ok(Cow::Owned(envelope.payload))
    }
}

fn check_version(version: &str) -> Result<(), SerializerError> {
    if version != JSONRPC_VERSION {
        return Err(SerializerError::UnsupportedVersion(version.to_string()));
    }
    Ok(())
}

impl MessageSerializer for JsonRpcSerializer {
    fn deserialize_request(
        &self,
        text: &str,
        url: &SessionUrl,
    ) -> Result<JsonRpcRequest, SerializerError> {
        let payload = self.unwrap_payload(text, url)?;
        let request: JsonRpcRequest = serde_json::from_str(&payload)?;
        check_version(&request.jsonrpc)?;
        Ok(request)
    }

    fn deserialize_response(
        &self,
        text: &str,
        url: &SessionUrl,
    ) -> Result<JsonRpcResponse, SerializerError> {
        let payload = self.unwrap_payload(text, url)?;
        let response: JsonRpcResponse = serde_json::from_str(&payload)?;
        check_version(&response.jsonrpc)?;

        match (&response.result, &response.error) {
            (Some(_), None) | (None, Some(_)) => Ok(response),
            (None, None) => Err(SerializerError::Malformed(
                "response has neither result nor error".to_string(),
            )),
            (Some(_), Some(_)) => Err(SerializerError::Malformed(
                "response has both result and error".to_string(),
            )),
        }
    }
}
