//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where events (and snapshots) are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    File,
    Postgres,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "file" => Ok(StorageKind::File),
            "postgres" | "postgresql" => Ok(StorageKind::Postgres),
            _ => Err(ConfigError::InvalidValue("LEDGER_STORAGE")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage backend for events and snapshots
    pub storage: StorageKind,

    /// Newline-delimited event log (file storage)
    pub event_log_path: PathBuf,

    /// Snapshot document (file storage)
    pub snapshot_path: PathBuf,

    /// Save a snapshot every N versions; 0 disables snapshots
    pub snapshot_interval: i64,

    /// Database connection URL (postgres storage)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::File,
            event_log_path: PathBuf::from("./events.log"),
            snapshot_path: PathBuf::from("./snapshots.json"),
            snapshot_interval: 100,
            database_url: None,
            database_max_connections: 10,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment, test map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let storage = match lookup("LEDGER_STORAGE") {
            Some(value) => value.parse()?,
            None => defaults.storage,
        };

        let event_log_path = lookup("EVENT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.event_log_path);

        let snapshot_path = lookup("SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.snapshot_path);

        let snapshot_interval: i64 = lookup("SNAPSHOT_INTERVAL")
            .unwrap_or_else(|| defaults.snapshot_interval.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SNAPSHOT_INTERVAL"))?;
        if snapshot_interval < 0 {
            return Err(ConfigError::InvalidValue("SNAPSHOT_INTERVAL"));
        }

        let database_url = lookup("DATABASE_URL");
        if storage == StorageKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| defaults.database_max_connections.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let environment = lookup("ENVIRONMENT").unwrap_or(defaults.environment);

        Ok(Self {
            storage,
            event_log_path,
            snapshot_path,
            snapshot_interval,
            database_url,
            database_max_connections,
            environment,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.snapshot_interval > 0
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
