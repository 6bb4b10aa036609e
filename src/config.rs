//! Configuration management for the dimension engine
//!
//! TOML file support, environment variable overrides and sensible defaults.
//!
//! ```toml
//! [storage]
//! backend = "redis"
//! dimensions_collection = "z_dimensions"
//!
//! [redis]
//! url = "redis://127.0.0.1:6379"
//!
//! [filter]
//! max_depth = 8
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Storage backend selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Redis connection settings (used when `storage.backend = "redis"`)
    #[serde(default)]
    pub redis: RedisSettings,

    /// Filter compilation limits
    #[serde(default)]
    pub filter: FilterConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Available storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, non-persistent
    #[default]
    Memory,
    /// Redis-backed collections
    Redis,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Backend to use
    #[serde(default)]
    pub backend: StorageBackend,

    /// Collection holding dimension definitions
    #[serde(default = "default_dimensions_collection")]
    pub dimensions_collection: String,
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSettings {
    /// Server URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum concurrent commands
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Command timeout in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Key prefix for all engine keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Filter compilation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Maximum nesting depth of a filter expression; also bounds dependency
    /// expansion of rows
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_dimensions_collection() -> String { "z_dimensions".to_string() }
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_pool_size() -> u32 { 16 }
fn default_connection_timeout_ms() -> u64 { 5_000 }
fn default_command_timeout_ms() -> u64 { 1_000 }
fn default_key_prefix() -> String { "minz".to_string() }
fn default_max_depth() -> usize { 8 }
fn default_log_level() -> String { "info".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dimensions_collection: default_dimensions_collection(),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisSettings {
    /// Connection timeout as a duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Command timeout as a duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Storage
        if let Ok(backend) = std::env::var("MINZ_STORAGE_BACKEND") {
            if let Ok(b) = backend.parse() {
                self.storage.backend = b;
            }
        }
        if let Ok(name) = std::env::var("MINZ_DIMENSIONS_COLLECTION") {
            self.storage.dimensions_collection = name;
        }

        // Redis
        if let Ok(url) = std::env::var("MINZ_REDIS_URL") {
            self.redis.url = url;
        }

        // Filter
        if let Ok(depth) = std::env::var("MINZ_FILTER_MAX_DEPTH") {
            if let Ok(d) = depth.parse() {
                self.filter.max_depth = d;
            }
        }

        // Logging
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.dimensions_collection.is_empty() {
            return Err(Error::Configuration(
                "Dimensions collection name cannot be empty".to_string(),
            ));
        }

        if self.filter.max_depth == 0 {
            return Err(Error::Configuration(
                "Filter max depth must be > 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Redis {
            if self.redis.url.is_empty() {
                return Err(Error::Configuration("Redis URL cannot be empty".to_string()));
            }
            if self.redis.pool_size == 0 {
                return Err(Error::Configuration(
                    "Redis pool size must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path, e))
        })
    }
}
