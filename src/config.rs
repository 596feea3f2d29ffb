//! Configuration management for Cargomail Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the content-addressed blob store
    pub blob_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Deadlines applied to store operations
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutConfig {
    /// Multi-statement read snapshots (list, sync)
    pub snapshot_ms: u64,
    /// Writes and point lookups
    pub statement_ms: u64,
}

impl TimeoutConfig {
    pub fn snapshot(&self) -> Duration {
        Duration::from_millis(self.snapshot_ms)
    }

    pub fn statement(&self) -> Duration {
        Duration::from_millis(self.statement_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            snapshot_ms: 3_000,
            statement_ms: 5_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite:./cargomail.db".to_string(),
                max_connections: 5,
            },
            storage: StorageConfig {
                blob_dir: PathBuf::from("./blobs"),
                max_upload_bytes: 25 * 1024 * 1024,
            },
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_var(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            storage: StorageConfig {
                blob_dir: env::var("BLOB_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.blob_dir),
                max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.storage.max_upload_bytes)?,
            },
            timeouts: TimeoutConfig {
                snapshot_ms: parse_var("SNAPSHOT_TIMEOUT_MS", defaults.timeouts.snapshot_ms)?,
                statement_ms: parse_var("STATEMENT_TIMEOUT_MS", defaults.timeouts.statement_ms)?,
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}
