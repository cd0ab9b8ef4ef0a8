//! Settings error type.

use thiserror::Error;

/// Failures while loading or validating configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file or locale file is not valid JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required credential is missing or empty.
    ///
    /// This is fatal at startup: there is no degraded mode without a
    /// gateway token.
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),

    /// A node entry is structurally invalid.
    #[error("invalid cluster node config: {0}")]
    InvalidNode(String),
}
