//! Push token registration configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    /// Collection holding user documents and their `devices` map.
    pub users_collection: String,
    /// Timeout for obtaining a token from the OS push service (1000-60000).
    pub token_timeout_ms: u32,
    /// Timeout for device map reads (500-30000).
    pub read_timeout_ms: u32,
    /// Timeout for device map writes (500-30000).
    pub write_timeout_ms: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            users_collection: "users".into(),
            token_timeout_ms: 10_000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl PushConfig {
    pub fn token_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.token_timeout_ms))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.write_timeout_ms))
    }
}
