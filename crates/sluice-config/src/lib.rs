//! Configuration for the sluice pipeline.
//!
//! Three layers, later ones winning: serde defaults, an optional YAML file
//! (`sluice.yaml`, or the path given with `--config`), and environment
//! variables. The environment names are the pipeline's public contract:
//! `BATCH_SIZE`, `FLUSH_TIMEOUT_SECONDS`, `DATA_STREAM_URL`,
//! `METADATA_DIR`, `WAL_FILE`, plus `RELATIONAL_*` and `DOCUMENT_*` for
//! the backend connections.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default config file probed in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sluice.yaml";

/// Environment keys merged at the top level of the config.
const TOP_LEVEL_ENV_KEYS: &[&str] = &[
    "batch_size",
    "flush_timeout_seconds",
    "data_stream_url",
    "metadata_dir",
    "wal_file",
];

/// Errors that can occur while loading configuration.
///
/// These map to CLI exit code 2 (misconfiguration).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration could not be read, parsed or extracted.
    #[error("configuration error: {0}")]
    Extraction(#[from] figment::Error),

    /// A configuration value was invalid.
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Connection settings for one backend.
///
/// `path` points the embedded reference drivers at their on-disk location;
/// host/port/user/password/database describe an external server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// On-disk location override for the embedded drivers.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            host: default_host(),
            port: 0,
            user: String::new(),
            password: String::new(),
            database: default_database(),
            path: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_database() -> String {
    "sluice".to_string()
}

/// The full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Relational backend connection.
    #[serde(default = "default_relational")]
    pub relational: BackendConfig,

    /// Document backend connection.
    #[serde(default = "default_document")]
    pub document: BackendConfig,

    /// Records buffered before a flush is forced.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds after which a non-empty buffer is flushed anyway.
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_seconds: f64,

    /// Polling endpoint for `ingest`.
    #[serde(default = "default_stream_url")]
    pub data_stream_url: String,

    /// Directory holding decisions, statistics, state and the lock file.
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,

    /// Write-ahead log location.
    #[serde(default = "default_wal_file")]
    pub wal_file: PathBuf,

    /// Relational table written by the router.
    #[serde(default = "default_table")]
    pub table: String,

    /// Document collection written by the router.
    #[serde(default = "default_table")]
    pub collection: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            relational: default_relational(),
            document: default_document(),
            batch_size: default_batch_size(),
            flush_timeout_seconds: default_flush_timeout(),
            data_stream_url: default_stream_url(),
            metadata_dir: default_metadata_dir(),
            wal_file: default_wal_file(),
            table: default_table(),
            collection: default_table(),
        }
    }
}

fn default_relational() -> BackendConfig {
    BackendConfig {
        port: 3306,
        user: "root".to_string(),
        ..BackendConfig::default()
    }
}

fn default_document() -> BackendConfig {
    BackendConfig {
        port: 27017,
        ..BackendConfig::default()
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_flush_timeout() -> f64 {
    5.0
}

fn default_stream_url() -> String {
    "http://127.0.0.1:8000/".to_string()
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("data/metadata")
}

fn default_wal_file() -> PathBuf {
    PathBuf::from("data/wal.log")
}

fn default_table() -> String {
    "records".to_string()
}

impl PipelineConfig {
    /// On-disk location of the embedded relational database.
    pub fn relational_path(&self) -> PathBuf {
        self.relational
            .path
            .clone()
            .unwrap_or_else(|| self.metadata_dir.join(format!("{}.db", self.relational.database)))
    }

    /// On-disk directory of the embedded document store.
    pub fn document_dir(&self) -> PathBuf {
        self.document
            .path
            .clone()
            .unwrap_or_else(|| self.metadata_dir.join("documents"))
    }

    /// Sanity checks beyond type-level validation.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.flush_timeout_seconds.is_finite() || self.flush_timeout_seconds <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "flush_timeout_seconds".to_string(),
                reason: "must be a positive number of seconds".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads the configuration.
///
/// With an explicit path the file must exist; otherwise `sluice.yaml` is
/// used when present. Environment variables override either.
pub fn load(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));
    figment = match explicit {
        Some(path) => figment.merge(Yaml::file_exact(path)),
        None => figment.merge(Yaml::file(DEFAULT_CONFIG_FILE)),
    };
    figment = figment
        .merge(Env::raw().only(TOP_LEVEL_ENV_KEYS))
        .merge(
            Env::prefixed("RELATIONAL_")
                .map(|key| format!("relational.{key}").into())
                .split("."),
        )
        .merge(
            Env::prefixed("DOCUMENT_")
                .map(|key| format!("document.{key}").into())
                .split("."),
        );

    let config: PipelineConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
