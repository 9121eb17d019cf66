//! Configuration schema types for Locus.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod connectivity;
mod presence;
mod push;
mod settings;
mod system;

pub use connectivity::*;
pub use presence::*;
pub use push::*;
pub use settings::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Locus.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LocusConfig {
    pub connectivity: ConnectivityConfig,
    pub presence: PresenceConfig,
    pub push: PushConfig,
    pub settings: SettingsConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_connectivity_windows() {
        let config = LocusConfig::default();
        assert_eq!(
            config.connectivity.reachability_debounce(),
            Duration::from_millis(1500)
        );
        assert_eq!(
            config.connectivity.lifecycle_debounce(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn default_presence() {
        let config = LocusConfig::default();
        assert!(config.presence.enabled);
        assert_eq!(config.presence.status_path, "status");
        assert_eq!(config.presence.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.presence.retry_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn default_push_and_settings() {
        let config = LocusConfig::default();
        assert!(config.push.enabled);
        assert_eq!(config.push.users_collection, "users");
        assert_eq!(config.push.token_timeout(), Duration::from_secs(10));
        assert_eq!(config.push.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.settings.collection, "notificationSettings");
        assert_eq!(config.settings.read_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn default_logging_is_info() {
        let config = LocusConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.level.directive(), "locus=info");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: LocusConfig = toml::from_str(
            r#"
[presence]
write_timeout_ms = 2000

[logging]
level = "DEBUG"
"#,
        )
        .unwrap();
        assert_eq!(config.presence.write_timeout_ms, 2000);
        assert_eq!(config.presence.retry_backoff_ms, 1000);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.push.users_collection, "users");
    }

    #[test]
    fn empty_toml_is_default() {
        let config: LocusConfig = toml::from_str("").unwrap();
        assert_eq!(config.cache.file_name, "cache.json");
        assert!(config.cache.directory.is_empty());
    }
}
