//! Configuration for the `kanban` terminal client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error, and so is a store URL
//! that is not `ws://` or `wss://`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};

use crate::remote::ws::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, WsStoreConfig};
use crate::sync::worker::DEFAULT_CHANNEL_CAPACITY;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The store URL is not a usable WebSocket URL.
    #[error("invalid store URL {url}: {reason}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The timestamp format is not a valid chrono format string.
    #[error("invalid timestamp format {0:?}")]
    InvalidTimestampFormat(String),
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    remote: RemoteFileConfig,
    sync: SyncFileConfig,
    ui: UiFileConfig,
}

/// `[remote]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RemoteFileConfig {
    store_url: Option<String>,
    project_id: Option<String>,
    access_key: Option<String>,
    collection: Option<String>,
    connect_timeout_secs: Option<u64>,
    handshake_timeout_secs: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    channel_capacity: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    poll_timeout_ms: Option<u64>,
    timestamp_format: Option<String>,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    // -- Remote --
    /// Store WebSocket URL. `None` runs the board offline.
    pub store_url: Option<String>,
    /// Project presented in the handshake.
    pub project_id: String,
    /// Access key presented in the handshake.
    pub access_key: Option<String>,
    /// Collection holding the tasks.
    pub collection: String,
    /// Timeout for opening the store connection.
    pub connect_timeout: Duration,
    /// Timeout for the store handshake.
    pub handshake_timeout: Duration,

    // -- Sync --
    /// Capacity of the sync command/event channels.
    pub channel_capacity: usize,

    // -- UI --
    /// Poll timeout for the TUI event loop.
    pub poll_timeout: Duration,
    /// Format of the last-snapshot time in the status bar (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            project_id: "kanban".to_string(),
            access_key: None,
            collection: "Tasks".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            poll_timeout: Duration::from_millis(50),
            timestamp_format: "%H:%M:%S".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// the file cannot be parsed, or the resulting store URL or timestamp
    /// format is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        if let Some(url) = &config.store_url {
            validate_store_url(url)?;
        }
        validate_timestamp_format(&config.timestamp_format)?;
        Ok(config)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            store_url: cli
                .store_url
                .clone()
                .or_else(|| file.remote.store_url.clone())
                .filter(|u| !u.is_empty()),
            project_id: cli
                .project_id
                .clone()
                .or_else(|| file.remote.project_id.clone())
                .unwrap_or(defaults.project_id),
            access_key: cli
                .access_key
                .clone()
                .or_else(|| file.remote.access_key.clone())
                .filter(|k| !k.is_empty()),
            collection: cli
                .collection
                .clone()
                .or_else(|| file.remote.collection.clone())
                .unwrap_or(defaults.collection),
            connect_timeout: file
                .remote
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            handshake_timeout: file
                .remote
                .handshake_timeout_secs
                .map_or(defaults.handshake_timeout, Duration::from_secs),
            channel_capacity: file
                .sync
                .channel_capacity
                .filter(|&c| c > 0)
                .unwrap_or(defaults.channel_capacity),
            poll_timeout: file
                .ui
                .poll_timeout_ms
                .map_or(defaults.poll_timeout, Duration::from_millis),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Connection settings for [`crate::remote::ws::WsStore`].
    ///
    /// Returns `None` when no store URL is configured (offline mode).
    #[must_use]
    pub fn to_store_config(&self) -> Option<WsStoreConfig> {
        let url = self.store_url.clone()?;
        Some(WsStoreConfig {
            url,
            project_id: self.project_id.clone(),
            access_key: self.access_key.clone(),
            collection: self.collection.clone(),
            connect_timeout: self.connect_timeout,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

/// Checks that a store URL parses and uses a WebSocket scheme.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidUrl`] otherwise.
pub fn validate_store_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Checks that a chrono format string has no unknown specifiers.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTimestampFormat`] otherwise.
pub fn validate_timestamp_format(format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidTimestampFormat(format.to_string()));
    }
    Ok(())
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal kanban board synchronized through a live document store")]
pub struct CliArgs {
    /// WebSocket URL of the store (e.g. `ws://127.0.0.1:9100/ws`).
    #[arg(long, env = "KANBAN_STORE_URL")]
    pub store_url: Option<String>,

    /// Project to open.
    #[arg(long, env = "KANBAN_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Access key for the store.
    #[arg(long, env = "KANBAN_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Collection holding the tasks.
    #[arg(long, env = "KANBAN_COLLECTION")]
    pub collection: Option<String>,

    /// Path to config file (default: `~/.config/kanban/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Format of the last-snapshot time (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/kanban.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        p.to_path_buf()
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        let path = config_dir.join("kanban").join("config.toml");
        if !path.exists() {
            return Ok(ConfigFile::default());
        }
        path
    };

    let contents = std::fs::read_to_string(&path)
        .map_err(|source| ConfigError::ReadFile { path, source })?;
    Ok(toml::from_str(&contents)?)
}
