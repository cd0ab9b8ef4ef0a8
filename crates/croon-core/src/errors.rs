//! Shared error types.

use thiserror::Error;

use crate::state::ConnectionState;

/// Failures in the foundation layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A lifecycle transition that the state machine does not permit.
    #[error("invalid connection state transition: {from} -> {to}")]
    InvalidTransition {
        /// State the session was in.
        from: ConnectionState,
        /// State that was requested.
        to: ConnectionState,
    },

    /// A redaction pattern could not be compiled.
    #[error("failed to build redaction pattern: {0}")]
    RedactionPattern(#[from] regex::Error),

    /// JSON encoding/decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
