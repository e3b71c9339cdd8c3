//! Configuration loading and resolution
//!
//! Resolution priority (highest first):
//! 1. Command-line argument (clap, which also reads the matching env variable)
//! 2. TOML config file
//! 3. Compiled default
//!
//! A missing TOML file is not an error: the server logs a warning and starts
//! with defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Default HTTP bind address for the server
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5780";

/// Default SSE heartbeat interval
pub const DEFAULT_HEARTBEAT_SECS: u64 = 15;

/// Default terminal reconciliation interval
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Storage implementation selected at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Durable SQLite database
    #[default]
    Sqlite,
    /// Ephemeral in-process store (lost on restart)
    Memory,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(Error::Config(format!(
                "Unknown storage backend '{}' (expected 'sqlite' or 'memory')",
                other
            ))),
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_path: Option<PathBuf>,
}

/// `[events]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub heartbeat_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing directive; `RUST_LOG` still wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of `presswork.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub storage: StorageConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

/// Platform config file location: `<config dir>/presswork/presswork.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("presswork").join("presswork.toml"))
}

/// Platform data location for the SQLite database
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("presswork"))
        .unwrap_or_else(|| PathBuf::from("./presswork_data"))
        .join("presswork.db")
}

/// Load a TOML config file, falling back to defaults when it does not exist
///
/// A file that exists but cannot be parsed is an error: silently ignoring a
/// typo in the storage backend would be worse than refusing to start.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded config file {}", path.display());
    Ok(config)
}

/// Values supplied on the command line (or their env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub storage_backend: Option<StorageBackend>,
    pub database_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub storage_backend: StorageBackend,
    pub database_path: PathBuf,
    pub heartbeat_secs: u64,
    pub log_level: String,
}

impl ServerConfig {
    pub fn resolve(overrides: ConfigOverrides, toml: TomlConfig) -> Self {
        Self {
            bind_addr: overrides
                .bind_addr
                .or(toml.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            storage_backend: overrides.storage_backend.unwrap_or(toml.storage.backend),
            database_path: overrides
                .database_path
                .or(toml.storage.database_path)
                .unwrap_or_else(default_database_path),
            heartbeat_secs: toml.events.heartbeat_secs.max(1),
            log_level: overrides.log_level.unwrap_or(toml.logging.level),
        }
    }
}
