//! Gateway error type.

use thiserror::Error;

/// Failures at the remote-session boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The initial handshake with the platform failed.
    #[error("gateway handshake failed: {0}")]
    Handshake(String),

    /// The underlying transport failed.
    #[error("gateway transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// An operation was attempted on a disconnected handle.
    #[error("gateway is not connected")]
    NotConnected,

    /// A wire frame could not be encoded or decoded.
    #[error("gateway frame codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
