//! Locus configuration.
//!
//! TOML-based configuration for the presence and notification-state sync
//! subsystem. Every section uses serde defaults so a partial (or empty)
//! config file works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use locus_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    CacheConfig, ConnectivityConfig, LocusConfig, LogLevel, LoggingConfig, PresenceConfig,
    PushConfig, SettingsConfig, CONFIG_SCHEMA_VERSION,
};
pub use toml_loader::{cache_file_path, load_default, load_from_path};

use locus_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// Creates a default `config.toml` in the OS config directory if none exists.
pub fn load_config() -> Result<LocusConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &LocusConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
