//! Session URL parsing
//!
//! A session URL identifies one logical bridge connection:
//!
//! ```text
//! wc:<topic>@<version>?bridge=<percent-encoded bridge URL>&key=<64 hex chars>
//! ```
//!
//! The bridge URL and the topic together form the connection's endpoint
//! identity. The key is carried for the layers above the connection and is
//! never printed by `Debug`.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::{form_urlencoded, Url};

use crate::errors::SessionUrlError;

/// URI scheme of a session URL
pub const SESSION_SCHEME: &str = "wc";

/// Length of the symmetric session key in bytes
pub const SESSION_KEY_LEN: usize = 32;

// ----------------------------------------------------------------------------
// Session URL
// ----------------------------------------------------------------------------

/// Parsed session URL
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionUrl {
    topic: String,
    version: String,
    bridge: Url,
    key: [u8; SESSION_KEY_LEN],
}

impl SessionUrl {
    /// Build a session URL from its parts
    pub fn new(
        topic: impl Into<String>,
        version: impl Into<String>,
        bridge: Url,
        key: [u8; SESSION_KEY_LEN],
    ) -> Result<Self, SessionUrlError> {
        let topic = topic.into();
        let version = version.into();

        if topic.is_empty() {
            return Err(SessionUrlError::MissingTopic);
        }
        if version.is_empty() {
            return Err(SessionUrlError::MissingVersion);
        }
        check_bridge_scheme(&bridge)?;

        Ok(Self {
            topic,
            version,
            bridge,
            key,
        })
    }

    /// Parse a `wc:` session URL
    pub fn parse(input: &str) -> Result<Self, SessionUrlError> {
        let url = Url::parse(input.trim())
            .map_err(|e| SessionUrlError::InvalidFormat(e.to_string()))?;

        if url.scheme() != SESSION_SCHEME {
            return Err(SessionUrlError::InvalidFormat(format!(
                "expected `{}:` scheme, got `{}:`",
                SESSION_SCHEME,
                url.scheme()
            )));
        }

        let (topic, version) = match url.path().split_once('@') {
            Some((topic, version)) => (topic, version),
            None => (url.path(), ""),
        };
        if topic.is_empty() {
            return Err(SessionUrlError::MissingTopic);
        }
        if version.is_empty() {
            return Err(SessionUrlError::MissingVersion);
        }

        let mut bridge = None;
        let mut key = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "bridge" => bridge = Some(value.into_owned()),
                "key" => key = Some(value.into_owned()),
                _ => {}
            }
        }

        let bridge = bridge.ok_or(SessionUrlError::MissingParameter("bridge"))?;
        let bridge = Url::parse(&bridge).map_err(|e| SessionUrlError::InvalidBridge {
            url: bridge.clone(),
            reason: e.to_string(),
        })?;
        let key = decode_key(&key.ok_or(SessionUrlError::MissingParameter("key"))?)?;

        Self::new(topic, version, bridge, key)
    }

    /// Session topic (channel discriminator on the bridge)
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Protocol version string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bridge URL exactly as given in the session URL
    pub fn bridge(&self) -> &Url {
        &self.bridge
    }

    /// Raw symmetric session key
    pub fn key(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.key
    }

    /// WebSocket endpoint of the bridge (`https` becomes `wss`, `http` becomes `ws`)
    pub fn socket_url(&self) -> Result<Url, SessionUrlError> {
        let scheme = match self.bridge.scheme() {
            "https" => "wss",
            "http" => "ws",
            "ws" | "wss" => return Ok(self.bridge.clone()),
            other => return Err(SessionUrlError::UnsupportedScheme(other.to_string())),
        };

        let mut url = self.bridge.clone();
        url.set_scheme(scheme)
            .map_err(|_| SessionUrlError::UnsupportedScheme(self.bridge.scheme().to_string()))?;
        Ok(url)
    }

    /// Label identifying this endpoint in logs: `<bridge>-<topic>`
    pub fn endpoint_label(&self) -> String {
        format!("{}-{}", self.bridge, self.topic)
    }
}

fn check_bridge_scheme(bridge: &Url) -> Result<(), SessionUrlError> {
    match bridge.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(()),
        other => Err(SessionUrlError::UnsupportedScheme(other.to_string())),
    }
}

fn decode_key(hex_key: &str) -> Result<[u8; SESSION_KEY_LEN], SessionUrlError> {
    let bytes = hex::decode(hex_key).map_err(|e| SessionUrlError::InvalidKey(e.to_string()))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        SessionUrlError::InvalidKey(format!(
            "expected {} bytes, got {}",
            SESSION_KEY_LEN,
            bytes.len()
        ))
    })
}

// ----------------------------------------------------------------------------
// Formatting and Parsing Traits
// ----------------------------------------------------------------------------

impl fmt::Display for SessionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bridge: String = form_urlencoded::byte_serialize(self.bridge.as_str().as_bytes()).collect();
        write!(
            f,
            "{}:{}@{}?bridge={}&key={}",
            SESSION_SCHEME,
            self.topic,
            self.version,
            bridge,
            hex::encode(self.key)
        )
    }
}

impl fmt::Debug for SessionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionUrl")
            .field("topic", &self.topic)
            .field("version", &self.version)
            .field("bridge", &self.bridge.as_str())
            .field("key", &"<redacted>")
            .finish()
    }
}

impl FromStr for SessionUrl {
    type Err = SessionUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SessionUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
