//! Where locus keeps its files on disk.
//!
//! Config lives under the platform config directory and the local cache
//! under the platform data directory, each in a `locus/` subdirectory.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use locus_common::ConfigError;
use tracing::{debug, info};

use super::template::default_config_toml;
use crate::schema::CacheConfig;

const APP_DIR: &str = "locus";
const CONFIG_FILE: &str = "config.toml";

fn app_dir(base: Option<PathBuf>, kind: &str) -> Result<PathBuf, ConfigError> {
    base.map(|base| base.join(APP_DIR))
        .ok_or_else(|| ConfigError::ParseError(format!("could not determine {kind} directory")))
}

/// `<config_dir>/locus/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dir(dirs::config_dir(), "config")?.join(CONFIG_FILE))
}

/// Local cache file: `file_name` inside the configured directory, or inside
/// `<data_dir>/locus` when no directory is configured.
pub fn cache_file_path(config: &CacheConfig) -> Result<PathBuf, ConfigError> {
    let directory = match config.directory.trim() {
        "" => app_dir(dirs::data_dir(), "data")?,
        configured => PathBuf::from(configured),
    };
    Ok(directory.join(&config.file_name))
}

/// Write the commented template to `path`. A file that already exists is
/// left untouched, even if it appeared after the caller checked.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let write_err = |e: std::io::Error| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!("config already present at {}, leaving it", path.display());
            return Ok(());
        }
        Err(e) => return Err(write_err(e)),
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(write_err)?;

    info!("created default config at {}", path.display());
    Ok(())
}
