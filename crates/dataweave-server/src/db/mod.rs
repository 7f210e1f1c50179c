//! Database pool and schema management

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

use crate::config::DatabaseConfig;

pub mod schema;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),
}

impl DbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Connection options for a database URL, creating the file if it does not exist
pub fn connect_options(url: &str) -> DbResult<SqliteConnectOptions> {
    if url.trim().is_empty() {
        return Err(DbError::config("DATABASE_URL is empty"));
    }
    if !url.starts_with("sqlite:") {
        return Err(DbError::config(format!("unsupported database URL '{}'", url)));
    }

    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| DbError::config(format!("invalid database URL '{}': {}", url, e)))?
        .create_if_missing(true)
        .foreign_keys(true);

    Ok(options)
}

pub async fn create_pool(config: &DatabaseConfig) -> DbResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(connect_options(&config.url)?)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}
