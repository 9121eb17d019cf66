//! Notification settings store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Collection holding one settings document per user.
    pub collection: String,
    /// Timeout for the reconciliation read in milliseconds (500-30000).
    pub read_timeout_ms: u32,
    /// Timeout for each remote settings write in milliseconds (500-30000).
    pub write_timeout_ms: u32,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            collection: "notificationSettings".into(),
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl SettingsConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.write_timeout_ms))
    }
}
