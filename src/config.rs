//! Configuration System
//!
//! Layered configuration for cache defaults, request defaults, the bundled HTTP transport
//! and logging. Sources are merged by the `config` crate: built-in defaults, the global
//! file, workspace files, then `COURIER_*` environment variables.

use crate::cache::DEFAULT_GET_TTL_MS;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Defaults applied to every orchestration entry
    #[serde(default)]
    pub requests: RequestDefaults,

    /// Bundled HTTP transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for GET requests without an explicit policy; 0 disables default caching
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Open a durable store for entries cached in persistent mode
    #[serde(default)]
    pub persistent: bool,

    /// Location of the durable store (defaults to the platform data dir)
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

fn default_ttl_ms() -> u64 {
    DEFAULT_GET_TTL_MS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            persistent: false,
            storage_path: None,
        }
    }
}

impl CacheConfig {
    /// Configured storage path, or `<data dir>/courier/cache`
    pub fn resolved_storage_path(&self) -> PathBuf {
        if let Some(path) = &self.storage_path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "courier")
            .map(|dirs| dirs.data_dir().join("cache"))
            .unwrap_or_else(|| PathBuf::from(".courier/cache"))
    }
}

/// Per-entry request defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDefaults {
    /// Fire on the first entry when the use site does not say otherwise
    #[serde(default = "default_true")]
    pub immediate: bool,

    /// Join concurrent attempts with the same key onto one transport call
    #[serde(default = "default_true")]
    pub share_request: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            immediate: true,
            share_request: true,
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Prefix for relative method urls
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout; 0 means no timeout
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Cache(String),
    Transport(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Transport(msg) => write!(f, "Transport: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl CourierConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(path) = &self.cache.storage_path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Cache(
                    "storage_path cannot be empty".to_string(),
                ));
            }
        }

        if let Some(base_url) = &self.transport.base_url {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                errors.push(ValidationError::Transport(format!(
                    "base_url must be an http(s) url, got '{}'",
                    base_url
                )));
            }
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
