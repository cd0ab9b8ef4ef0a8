//! Plugin error type.

use thiserror::Error;

/// Failures inside a handler, contained at the dispatch boundary.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The handler could not complete.
    #[error("{0}")]
    Failed(String),

    /// Arguments did not match what the command expects.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] croon_storage::StorageError),
}
