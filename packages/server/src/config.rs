//! Environment configuration.
//!
//! Values are read from `HIROBA_*` environment variables (an optional `.env`
//! file is loaded first). CLI flags may override the bind address afterwards.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    ui::{ConnectionSettings, SweepSettings},
    usecase::UploadLimits,
};

pub const ENV_PREFIX: &str = "HIROBA_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// HS256 secret used to verify connection tokens
    pub jwt_secret: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Directory where merged uploads are written
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_upload_idle_timeout_secs")]
    pub upload_idle_timeout_secs: u64,

    #[serde(default = "default_upload_sweep_interval_secs")]
    pub upload_sweep_interval_secs: u64,

    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: u32,

    /// Upper bound of chunk bytes one user may hold across unmerged uploads
    #[serde(default = "default_max_buffered_bytes_per_user")]
    pub max_buffered_bytes_per_user: usize,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    /// Optional JSON file seeding rooms and members
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable error: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        let config: Config = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()
    }

    /// Load configuration from explicit `(KEY, value)` pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt_secret must not be empty".into()));
        }
        if self.max_total_chunks == 0
            || self.max_chunk_bytes == 0
            || self.max_buffered_bytes_per_user == 0
        {
            return Err(ConfigError::Invalid("upload limits must be positive".into()));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be positive".into()));
        }
        if self.ping_interval_secs == 0 || self.ping_timeout_secs <= self.ping_interval_secs {
            return Err(ConfigError::Invalid(
                "ping_timeout_secs must be greater than a non-zero ping_interval_secs".into(),
            ));
        }
        if self.upload_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "upload_sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(self)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_chunk_bytes: self.max_chunk_bytes,
            max_total_chunks: self.max_total_chunks,
            max_buffered_bytes_per_user: self.max_buffered_bytes_per_user,
        }
    }

    pub fn upload_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_idle_timeout_secs)
    }

    pub fn upload_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.upload_sweep_interval_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            ping_interval: self.ping_interval(),
            ping_timeout: self.ping_timeout(),
        }
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            interval: self.upload_sweep_interval(),
            idle_timeout: self.upload_idle_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_upload_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_upload_sweep_interval_secs() -> u64 {
    60
}

fn default_max_chunk_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_total_chunks() -> u32 {
    10_000
}

fn default_max_buffered_bytes_per_user() -> usize {
    256 * 1024 * 1024
}

fn default_history_limit() -> usize {
    crate::usecase::DEFAULT_HISTORY_LIMIT
}

fn default_ping_interval_secs() -> u64 {
    25
}

fn default_ping_timeout_secs() -> u64 {
    60
}
