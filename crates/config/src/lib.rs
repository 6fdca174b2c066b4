//! Configuration parsing and validation for PeerQueue
//!
//! Configuration is a single YAML file with `${VAR}` environment
//! substitution applied before deserialization.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub mod substitution;
pub mod validator;

pub use substitution::{has_unresolved_env_vars, substitute_env_vars};
pub use validator::validate_config;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub app: AppSection,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppSection {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "queue_engine=debug,info")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: pretty, json, or compact
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Queue store backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Backend name: "memory" or "postgres"
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            postgres: None,
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    /// Connection URL, typically `${DATABASE_URL}` in the file
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Port the Prometheus exporter listens on
    pub port: u16,
}

/// Load, substitute, and parse a config file
///
/// Environment substitution runs before YAML parsing, so `${VAR}` can
/// appear anywhere in the file, including inside quoted strings.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_str = path.as_ref().display().to_string();
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path_str.clone(),
        source,
    })?;

    let substituted = substitute_env_vars(&raw)?;
    let config: AppConfig = serde_yaml::from_str(&substituted)?;

    tracing::debug!(path = %path_str, "Config loaded");
    Ok(config)
}

/// Serialize a config back to a YAML file
pub fn save_config<P: AsRef<Path>>(config: &AppConfig, path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&path, yaml).map_err(|source| ConfigError::Io {
        path: path.as_ref().display().to_string(),
        source,
    })
}

/// Build a default configuration (memory store, pretty logging)
pub fn generate_default_config() -> AppConfig {
    AppConfig {
        app: AppSection {
            name: "peerqueue".to_string(),
            description: "Peer-to-peer withdrawal/deposit matching queue".to_string(),
        },
        logging: LoggingConfig::default(),
        store: StoreConfig::default(),
        metrics: None,
    }
}
