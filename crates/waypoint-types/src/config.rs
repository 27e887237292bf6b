//! Configuration types for Waypoint.
//!
//! `WaypointConfig` represents the top-level `waypoint.toml`. Every field has
//! a default, so an empty file (or no file) is a valid configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaypointConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Behaviour of the flow execution repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Continuations retained per conversation before the oldest is evicted.
    /// Zero means unbounded.
    #[serde(default = "default_max_continuations")]
    pub max_continuations: usize,

    /// Live conversations retained before the oldest is ended.
    /// Zero means unbounded.
    #[serde(default)]
    pub max_conversations: usize,

    /// When false, saving under an existing key reuses its continuation id
    /// and overwrites the snapshot in place (no back-button history).
    #[serde(default = "default_true")]
    pub always_generate_new_next_key: bool,

    /// zstd-compress snapshot payloads.
    #[serde(default)]
    pub compress_snapshots: bool,
}

fn default_max_continuations() -> usize {
    30
}

fn default_true() -> bool {
    true
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_continuations: default_max_continuations(),
            max_conversations: 0,
            always_generate_new_next_key: default_true(),
            compress_snapshots: false,
        }
    }
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Export spans through the OpenTelemetry stdout exporter.
    #[serde(default)]
    pub otel: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            otel: false,
        }
    }
}
