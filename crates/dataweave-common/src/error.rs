//! Error types shared across Dataweave crates

use thiserror::Error;

/// Result type alias for shared Dataweave operations
pub type Result<T> = std::result::Result<T, DataweaveError>;

/// Errors raised by the shared queue and I/O helpers
#[derive(Error, Debug)]
pub enum DataweaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Queue '{queue}' could not be declared: {source}")]
    QueueDeclare {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DataweaveError {
    /// Whether the error came from the broker connection rather than local state
    pub fn is_broker(&self) -> bool {
        matches!(self, Self::Broker(_) | Self::QueueDeclare { .. })
    }
}
