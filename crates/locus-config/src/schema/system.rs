//! System configuration types: local cache and logging.

use serde::{Deserialize, Serialize};

/// Local key-value cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory override; empty means the platform data directory.
    pub directory: String,
    pub file_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            file_name: "cache.json".into(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[derive(Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// `tracing` filter directive for the locus crates.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "locus=debug",
            LogLevel::Info => "locus=info",
            LogLevel::Warning => "locus=warn",
            LogLevel::Error => "locus=error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
