//! Proxy configuration with layered loading.
//!
//! Sources, highest precedence first:
//! 1. Environment variables (`IMGCACHE_*`)
//! 2. TOML file named by `IMGCACHE_CONFIG_FILE`, if set
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::storage::validate_store_name;
use crate::cache::{DEFAULT_STORE_NAME, DEFAULT_TTL_MILLIS, EngineConfig};
use crate::fetch::http::DEFAULT_MAX_RESPONSE_BYTES;
use crate::host::HostOptions;

const ENV_PREFIX: &str = "IMGCACHE_";
const CONFIG_FILE_VAR: &str = "IMGCACHE_CONFIG_FILE";

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Log line format for the binary's subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Settings for the `imgcache-proxy` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the proxy listens on (`IMGCACHE_LISTEN_ADDR`).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Root directory of the persistent stores (`IMGCACHE_STORAGE_DIR`).
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Versioned store name; bump it to discard every older store on start.
    #[serde(default = "default_store_name")]
    pub store_name: String,

    #[serde(default = "default_ttl_millis")]
    pub ttl_millis: u64,

    /// Seconds between background sweeps.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    /// Sweep once right after start.
    #[serde(default = "default_true")]
    pub cleanup_on_start: bool,

    /// Upstream timeout in milliseconds; `0` disables it.
    #[serde(default)]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3128".into()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./imgcache-data")
}

fn default_store_name() -> String {
    DEFAULT_STORE_NAME.into()
}

fn default_ttl_millis() -> u64 {
    DEFAULT_TTL_MILLIS
}

fn default_maintenance_interval_secs() -> u64 {
    60 * 60
}

fn default_true() -> bool {
    true
}

fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage_dir: default_storage_dir(),
            store_name: default_store_name(),
            ttl_millis: default_ttl_millis(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            cleanup_on_start: true,
            fetch_timeout_ms: 0,
            max_response_bytes: default_max_response_bytes(),
            log_format: LogFormat::default(),
        }
    }
}

impl ProxyConfig {
    /// Loads configuration from all sources and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source cannot be read or parsed, or if
    /// validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            figment = figment.merge(Toml::file(path));
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config_file"])))
    }

    /// Extracts and validates a configuration from an assembled figment.
    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values after loading.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if:
    /// - `store_name` is not a usable store name (empty, dot-prefixed, or
    ///   containing a path separator)
    /// - `ttl_millis`, `maintenance_interval_secs`, or `max_response_bytes` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = validate_store_name(&self.store_name) {
            return Err(ConfigError::Invalid {
                field: "store_name",
                reason: e.to_string(),
            });
        }
        if self.ttl_millis == 0 {
            return Err(ConfigError::Invalid {
                field: "ttl_millis",
                reason: "must be greater than 0".into(),
            });
        }
        if self.maintenance_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "maintenance_interval_secs",
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_response_bytes",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig::new(self.store_name.clone(), self.ttl_millis)
    }

    pub fn host(&self) -> HostOptions {
        HostOptions {
            maintenance_interval: Duration::from_secs(self.maintenance_interval_secs),
            cleanup_on_start: self.cleanup_on_start,
        }
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }
}
