//! Application configuration loaded from TOML.
//!
//! Lookup order: `$FEEDER_SESSION_CONFIG`, then
//! `<config dir>/feeder-session/config.toml`. A missing file is not an error;
//! every section falls back to its defaults.

use crate::mqtt::config::{BrokerConfig, SessionConfig, TopicConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use std::fmt;
use tracing::Level;

pub const CONFIG_ENV: &str = "FEEDER_SESSION_CONFIG";
const CONFIG_DIR: &str = "feeder-session";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown log level: {0}")]
    LogLevel(String),
}

/// Where the loaded configuration came from. Reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults { missing: PathBuf },
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "configuration from {}", path.display()),
            ConfigSource::Defaults { missing } => write!(
                f,
                "default configuration ({} does not exist)",
                missing.display()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        self.level
            .parse::<Level>()
            .map_err(|_| ConfigError::LogLevel(self.level.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub topics: TopicConfig,
    pub session: SessionConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    /// Loads from the default location, falling back to defaults.
    pub async fn load() -> Result<(Self, ConfigSource), ConfigError> {
        Self::load_or_default(&default_config_path()).await
    }

    pub async fn load_or_default(path: &Path) -> Result<(Self, ConfigSource), ConfigError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let config = Self::load_from(path).await?;
            Ok((config, ConfigSource::File(path.to_path_buf())))
        } else {
            let missing = path.to_path_buf();
            Ok((Self::default(), ConfigSource::Defaults { missing }))
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}
