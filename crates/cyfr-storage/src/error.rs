//! Storage error types.

use thiserror::Error;

/// Errors from the adapter, cache, and database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path segment was empty, absolute, or attempted traversal.
    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying SQL failure.
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A migration step failed.
    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        /// Migration version number.
        version: u32,
        /// Migration name.
        name: &'static str,
        /// Underlying SQL failure.
        #[source]
        source: rusqlite::Error,
    },

    /// Stored value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
