//! Presence tracking configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Presence record writes against the realtime store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    /// Realtime path prefix; the record lives at `{status_path}/{user_id}`.
    pub status_path: String,
    /// Per-write timeout in milliseconds (500-30000).
    pub write_timeout_ms: u32,
    /// Delay before the single retry of a timed-out write (100-30000).
    pub retry_backoff_ms: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            status_path: "status".into(),
            write_timeout_ms: 5000,
            retry_backoff_ms: 1000,
        }
    }
}

impl PresenceConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.write_timeout_ms))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(u64::from(self.retry_backoff_ms))
    }
}
