//! Connection configuration

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ----------------------------------------------------------------------------
// Connection Configuration
// ----------------------------------------------------------------------------

/// Default interval between keepalive pings
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for a single bridge connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Interval between keepalive pings while the connection is open
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with a specific heartbeat interval
    pub fn with_heartbeat_interval(heartbeat_interval: Duration) -> Self {
        Self { heartbeat_interval }
    }

    /// Configuration for bridges behind aggressive idle-timeout proxies
    pub fn fast_heartbeat() -> Self {
        Self::with_heartbeat_interval(Duration::from_secs(5))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        Ok(())
    }
}
