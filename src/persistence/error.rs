//! Storage error types

use std::time::Duration;

/// Error type for comment storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The media key has never been registered
    #[error("media not found: {0}")]
    MediaNotFound(String),

    /// The call did not finish within the configured bound
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure reported by a non-database backend
    #[error("storage backend error: {0}")]
    Backend(String),
}
