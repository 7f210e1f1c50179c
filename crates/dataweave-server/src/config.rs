//! Configuration management

use std::time::Duration;

use dataweave_common::queue::{DEFAULT_BROKER_URL, DEFAULT_QUEUE_NAME};
use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://products.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default number of unacknowledged messages a consumer may hold.
pub const DEFAULT_CONSUMER_PREFETCH: u16 = 1;

/// Default number of times a transiently failing message is retried.
pub const DEFAULT_CONSUMER_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry, in milliseconds.
pub const DEFAULT_CONSUMER_RETRY_BACKOFF_MS: u64 = 500;

/// Upper bound on the retry delay, in milliseconds.
pub const DEFAULT_CONSUMER_RETRY_MAX_BACKOFF_MS: u64 = 30_000;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub cors: CorsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Message broker and consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub url: String,
    pub queue: String,
    pub prefetch: u16,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
}

impl BrokerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn retry_max_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_max_backoff_ms)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from `.env`, the environment, and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults
    ///
    /// Values that fail to parse are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Config {
            server: ServerConfig {
                host: lookup("DATAWEAVE_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                port: parsed(&lookup, "DATAWEAVE_PORT").unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: parsed(&lookup, "DATAWEAVE_SHUTDOWN_TIMEOUT")
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: parsed(&lookup, "DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: parsed(&lookup, "DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: parsed(&lookup, "DATABASE_IDLE_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            broker: BrokerConfig {
                url: lookup("RABBITMQ_URL").unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
                queue: lookup("QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
                prefetch: parsed(&lookup, "CONSUMER_PREFETCH").unwrap_or(DEFAULT_CONSUMER_PREFETCH),
                max_retries: parsed(&lookup, "CONSUMER_MAX_RETRIES")
                    .unwrap_or(DEFAULT_CONSUMER_MAX_RETRIES),
                retry_backoff_ms: parsed(&lookup, "CONSUMER_RETRY_BACKOFF_MS")
                    .unwrap_or(DEFAULT_CONSUMER_RETRY_BACKOFF_MS),
                retry_max_backoff_ms: parsed(&lookup, "CONSUMER_RETRY_MAX_BACKOFF_MS")
                    .unwrap_or(DEFAULT_CONSUMER_RETRY_MAX_BACKOFF_MS),
            },
            cors: CorsConfig {
                allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: parsed(&lookup, "CORS_ALLOW_CREDENTIALS").unwrap_or(false),
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.broker.url.is_empty() {
            anyhow::bail!("Broker URL cannot be empty");
        }

        if self.broker.queue.is_empty() {
            anyhow::bail!("Queue name cannot be empty");
        }

        if self.broker.prefetch == 0 {
            anyhow::bail!("Consumer prefetch must be greater than 0");
        }

        if self.broker.retry_backoff_ms > self.broker.retry_max_backoff_ms {
            anyhow::bail!(
                "Consumer retry backoff ({}ms) cannot exceed the maximum backoff ({}ms)",
                self.broker.retry_backoff_ms,
                self.broker.retry_max_backoff_ms
            );
        }

        // Allowing any origin with credentials is rejected by browsers.
        if self.cors.allow_credentials && self.cors.allowed_origins.iter().any(|o| o == "*") {
            anyhow::bail!("CORS credentials cannot be combined with a wildcard origin");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
