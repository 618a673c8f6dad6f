//! Settings for the `kanban-store` binary.
//!
//! A value given on the command line (or through its `KANBAN_*` variable)
//! wins over `~/.config/kanban-store/config.toml`, which wins over the
//! built-in defaults. The file has two tables:
//!
//! ```toml
//! [server]
//! bind_addr = "127.0.0.1:9100"
//! max_payload_size = 65536
//! max_documents = 10000
//!
//! [project]
//! id = "real-time"
//! access_key = "s3cret"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::collection::Collections;
use crate::server::StoreState;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9100";
const DEFAULT_PROJECT_ID: &str = "kanban";
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;
const DEFAULT_MAX_DOCUMENTS: usize = 10_000;

/// Reasons the store refuses to start with the given settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists (or was named) but could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// File that was tried.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the expected tables.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The bind address is not `host:port` with a literal IP.
    #[error("invalid bind address {addr}: {source}")]
    InvalidBindAddr {
        /// Address as configured.
        addr: String,
        /// Parser error.
        source: std::net::AddrParseError,
    },

    /// A size limit was set to zero, which would refuse every request.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreConfigFile {
    server: ServerTable,
    project: ProjectTable,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerTable {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
    max_documents: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ProjectTable {
    id: Option<String>,
    access_key: Option<String>,
}

/// Command line of the store binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban document store")]
pub struct StoreCliArgs {
    /// Address to listen on, e.g. `127.0.0.1:9100`.
    #[arg(short, long, env = "KANBAN_STORE_ADDR")]
    pub bind: Option<String>,

    /// Config file to use instead of `~/.config/kanban-store/config.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project id clients must present.
    #[arg(long, env = "KANBAN_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Access key clients must present (no check when unset).
    #[arg(long, env = "KANBAN_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Largest accepted frame, in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Most documents a single collection may hold.
    #[arg(long)]
    pub max_documents: Option<usize>,

    /// Log filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_STORE_LOG")]
    pub log_level: String,
}

/// Settings the store runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Project id clients must present in `Hello`.
    pub project_id: String,
    /// Access key clients must present, if any.
    pub access_key: Option<String>,
    /// Largest accepted frame, in bytes.
    pub max_payload_size: usize,
    /// Most documents per collection.
    pub max_documents: usize,
    /// Log filter string.
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
            project_id: DEFAULT_PROJECT_ID.to_string(),
            access_key: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_documents: DEFAULT_MAX_DOCUMENTS,
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// Reads the config file and merges it under the command line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a named config file is missing, the file
    /// does not parse, the bind address is malformed, or a limit is zero.
    pub fn load(cli: &StoreCliArgs) -> Result<Self, ConfigError> {
        let file = read_config_file(cli.config.as_deref())?;
        Self::merge(cli, file)
    }

    fn merge(cli: &StoreCliArgs, file: StoreConfigFile) -> Result<Self, ConfigError> {
        let raw_addr = cli
            .bind
            .clone()
            .or(file.server.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                addr: raw_addr.clone(),
                source,
            })?;

        let max_payload_size = cli
            .max_payload_size
            .or(file.server.max_payload_size)
            .unwrap_or(DEFAULT_MAX_PAYLOAD_SIZE);
        if max_payload_size == 0 {
            return Err(ConfigError::ZeroLimit("max_payload_size"));
        }
        let max_documents = cli
            .max_documents
            .or(file.server.max_documents)
            .unwrap_or(DEFAULT_MAX_DOCUMENTS);
        if max_documents == 0 {
            return Err(ConfigError::ZeroLimit("max_documents"));
        }

        Ok(Self {
            bind_addr,
            project_id: cli
                .project_id
                .clone()
                .or(file.project.id)
                .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()),
            // An empty key means "no check".
            access_key: cli
                .access_key
                .clone()
                .or(file.project.access_key)
                .filter(|key| !key.is_empty()),
            max_payload_size,
            max_documents,
            log_level: cli.log_level.clone(),
        })
    }

    /// Builds empty server state enforcing these settings.
    #[must_use]
    pub fn build_state(&self) -> StoreState {
        StoreState::with_config(
            self.project_id.clone(),
            self.access_key.clone(),
            self.max_payload_size,
            Collections::with_max_documents(self.max_documents),
        )
    }
}

/// Reads the named file, or the default one if it exists.
fn read_config_file(explicit_path: Option<&Path>) -> Result<StoreConfigFile, ConfigError> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => {
            let Some(config_dir) = dirs::config_dir() else {
                return Ok(StoreConfigFile::default());
            };
            let path = config_dir.join("kanban-store").join("config.toml");
            if !path.exists() {
                return Ok(StoreConfigFile::default());
            }
            path
        }
    };

    let contents =
        std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile { path, source })?;
    Ok(toml::from_str(&contents)?)
}
