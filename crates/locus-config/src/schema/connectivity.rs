//! Connectivity and lifecycle signal debouncing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Debounce windows applied to raw OS signals before they are emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Window for network reachability changes, in milliseconds (0-10000).
    pub reachability_debounce_ms: u32,
    /// Window for foreground/background transitions, in milliseconds (0-5000).
    pub lifecycle_debounce_ms: u32,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            reachability_debounce_ms: 1500,
            lifecycle_debounce_ms: 250,
        }
    }
}

impl ConnectivityConfig {
    pub fn reachability_debounce(&self) -> Duration {
        Duration::from_millis(u64::from(self.reachability_debounce_ms))
    }

    pub fn lifecycle_debounce(&self) -> Duration {
        Duration::from_millis(u64::from(self.lifecycle_debounce_ms))
    }
}
