//! Storage error type.

use thiserror::Error;

/// Failures in the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An operation was attempted before `connect()` (or after `destroy()`).
    #[error("storage is not connected")]
    NotConnected,

    /// The pool could not hand out a connection.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A statement failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema migration failed.
    #[error("migration to version {version} failed: {source}")]
    Migration {
        /// Target schema version.
        version: u32,
        /// Underlying database error.
        source: rusqlite::Error,
    },
}
