//! Engine configuration.
//!
//! Sourced from explicit construction or from the environment, following
//! the env-with-fallback-default idiom: each field is read from its env
//! var, falling back to a default when unset or unparsable.

use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Configuration for an [`crate::engine::Engine`] instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string for the persistent store. Required when using
    /// [`crate::store::postgres::PostgresStoreAdapter`]; unused by the in-memory fake.
    pub db_url: String,
    /// Interval between background flush ticks.
    pub flush_interval: Duration,
    /// Idle TTL for clean entries; also the eviction tick period.
    pub evict_interval: Duration,
    /// Upper bound on the store's connection pool.
    pub max_connections: u32,
}

impl Config {
    /// Builds a config explicitly, without consulting the environment.
    #[must_use]
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            flush_interval: Duration::from_secs(10),
            evict_interval: Duration::from_secs(30),
            max_connections: 5,
        }
    }

    /// Loads configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    ///
    /// Recognized variables: `PG_DSN`, `FLUSH_INTERVAL` (seconds), `IDLE_TTL`
    /// (seconds), `MAX_CONNECTIONS`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidArgument` if `PG_DSN` is not set. Unlike
    /// the other fields it has no sensible default -- a cache engine with
    /// nowhere to persist to is a configuration error, not a runtime one.
    pub fn from_env() -> EngineResult<Self> {
        let db_url = std::env::var("PG_DSN")
            .map_err(|_| EngineError::InvalidArgument("PG_DSN must be set".to_string()))?;

        let flush_interval = std::env::var("FLUSH_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(10));

        let evict_interval = std::env::var("IDLE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let max_connections = std::env::var("MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(5);

        Ok(Self {
            db_url,
            flush_interval,
            evict_interval,
            max_connections,
        })
    }
}
