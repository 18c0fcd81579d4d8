//! Error types for llmopt.

use crate::router::Metric;

/// Result type alias for llmopt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for llmopt.
///
/// Provider failures never appear here: the call wrapper records them as
/// `error`-status calls instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Unknown provider '{provider}'")]
    UnknownProvider { provider: String },

    #[error("No historical data to compute {metric} recommendation")]
    NoHistoricalData { metric: Metric },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from the metrics store.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Migration(_))
    }
}
