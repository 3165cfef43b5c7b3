//! Configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL, e.g. `sqlite://./data/querykit.db` or `sqlite::memory:`
    pub database_url: String,

    /// Maximum pooled connections (always 1 for in-memory databases)
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    pub connect_timeout: Duration,

    /// Emit logs as JSON instead of human-readable lines
    pub log_json: bool,

    /// Fallback filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(30),
            log_json: true,
            log_filter: "querykit=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            Err(_) => defaults.max_connections,
        };

        let connect_timeout = match env::var("DATABASE_CONNECT_TIMEOUT_SECS") {
            Ok(value) => Duration::from_secs(
                value
                    .parse()
                    .context("Invalid DATABASE_CONNECT_TIMEOUT_SECS")?,
            ),
            Err(_) => defaults.connect_timeout,
        };

        let log_json = match env::var("LOG_FORMAT") {
            Ok(format) => parse_log_format(&format)?,
            Err(_) => defaults.log_json,
        };

        Ok(Self {
            database_url,
            max_connections,
            connect_timeout,
            log_json,
            log_filter: env::var("LOG_FILTER").unwrap_or(defaults.log_filter),
        })
    }

    pub fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Pool size, clamped to one connection for in-memory databases since
    /// each connection would otherwise see its own empty database.
    pub fn pool_size(&self) -> u32 {
        if self.is_memory() {
            1
        } else {
            self.max_connections.max(1)
        }
    }
}

fn parse_log_format(format: &str) -> Result<bool> {
    match format.to_ascii_lowercase().as_str() {
        "json" => Ok(true),
        "pretty" | "plain" | "text" => Ok(false),
        other => anyhow::bail!("Invalid LOG_FORMAT: {other} (expected json or pretty)"),
    }
}
