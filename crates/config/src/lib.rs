#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for edx
//!
//! Values are resolved in this order, later sources winning:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/edx/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

use edx_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub transfer: TransferConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64, // seconds
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Fixed-delay retry applied to every outbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

/// Circuit breaker thresholds, shared per portal origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Chunking and parser buffer sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_chunk_size")]
    pub upload_chunk_size: u64,
    /// 0 disables ranged downloads
    #[serde(default = "default_chunk_size")]
    pub download_chunk_size: u64,
    #[serde(default = "default_search_buffer_size")]
    pub search_buffer_size: usize,
    #[serde(default = "default_max_stalled_rounds")]
    pub max_stalled_rounds: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            upload_chunk_size: default_chunk_size(),
            download_chunk_size: default_chunk_size(),
            search_buffer_size: default_search_buffer_size(),
            max_stalled_rounds: default_max_stalled_rounds(),
        }
    }
}

// Default value functions for serde
fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("edx/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_chunk_size() -> u64 {
    4 * 1024 * 1024 // 4 MiB
}

fn default_search_buffer_size() -> usize {
    4096
}

fn default_max_stalled_rounds() -> u32 {
    3
}

impl NetworkConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl RetryConfig {
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl BreakerConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("edx").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the default file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!("no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if an `EDX_*` variable holds a value that does not parse.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Some(timeout) = env_parse("EDX_TIMEOUT")? {
            self.network.timeout = timeout;
        }
        if let Some(attempts) = env_parse("EDX_RETRY_ATTEMPTS")? {
            self.retry.max_attempts = attempts;
        }
        if let Some(delay) = env_parse("EDX_RETRY_DELAY_MS")? {
            self.retry.delay_ms = delay;
        }
        if let Some(size) = env_parse("EDX_UPLOAD_CHUNK_SIZE")? {
            self.transfer.upload_chunk_size = size;
        }
        if let Some(size) = env_parse("EDX_DOWNLOAD_CHUNK_SIZE")? {
            self.transfer.download_chunk_size = size;
        }
        Ok(())
    }

    /// Reject values the transfer layer cannot work with
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "0"));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(invalid("breaker.failure_threshold", "0"));
        }
        if self.transfer.search_buffer_size < 2 {
            return Err(invalid(
                "transfer.search_buffer_size",
                &self.transfer.search_buffer_size.to_string(),
            ));
        }
        if self.transfer.max_stalled_rounds == 0 {
            return Err(invalid("transfer.max_stalled_rounds", "0"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Result<Option<T>, Error> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(var, &raw)),
        Err(_) => Ok(None),
    }
}

fn invalid(field: &str, value: &str) -> Error {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}
