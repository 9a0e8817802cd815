//! Application configuration for indexsync.
//!
//! User config lives at `~/.indexsync/indexsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{IndexSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "indexsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".indexsync";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "indexsync.db";

// ---------------------------------------------------------------------------
// Config structs (matching indexsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Queue database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Indexing backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Worker loop settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. Defaults to `~/.indexsync/indexsync.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Resolve the configured path, falling back to the config directory.
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(DB_FILE_NAME)),
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the indexing backend.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:10034".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long the worker sleeps when no job is due, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5_000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.indexsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| IndexSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.indexsync/indexsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| IndexSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| IndexSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| IndexSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IndexSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| IndexSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Parse the backend URL and check it is an absolute http(s) URL.
pub fn validate_backend_url(config: &AppConfig) -> Result<Url> {
    let raw = &config.backend.url;
    let url = Url::parse(raw)
        .map_err(|e| IndexSyncError::config(format!("invalid backend url '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(IndexSyncError::config(format!(
            "backend url '{raw}' must use http or https, not {other}"
        ))),
    }
}
