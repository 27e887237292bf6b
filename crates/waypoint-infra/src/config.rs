//! Configuration loader for Waypoint.
//!
//! Reads `waypoint.toml` and deserializes it into [`WaypointConfig`].
//! [`load_config`] falls back to defaults when the file is missing or
//! malformed; [`load_config_strict`] reports both conditions instead.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use waypoint_types::config::WaypointConfig;

/// File name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "waypoint.toml";

/// Environment variable naming an explicit config path.
pub const CONFIG_ENV_VAR: &str = "WAYPOINT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Resolve which config file to use.
///
/// Priority: explicit path, then `WAYPOINT_CONFIG`, then `./waypoint.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`WaypointConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and
///   returns the default.
pub fn load_config(path: &Path) -> WaypointConfig {
    match load_config_strict(path) {
        Ok(config) => config,
        Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            WaypointConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            WaypointConfig::default()
        }
    }
}

/// Load configuration from `path`, failing on a missing or invalid file.
pub fn load_config_strict(path: &Path) -> Result<WaypointConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
