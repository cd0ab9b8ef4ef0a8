//! Audio error type.

use thiserror::Error;

use croon_core::{GuildId, NodeId};

/// Failures in the audio cluster layer.
///
/// Node-scoped failures stay node-scoped: the caller logs them and the
/// guild in question fails its operation, nothing else.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The node's control channel is down.
    #[error("audio node {0} is unavailable")]
    NodeUnavailable(NodeId),

    /// No configured node is currently available.
    #[error("no available audio node")]
    NoAvailableNode,

    /// Node handshake was rejected.
    #[error("audio node handshake failed: {0}")]
    Handshake(String),

    /// Control channel transport failed.
    #[error("audio node transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// REST call to the node failed.
    #[error("audio node http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A node payload could not be encoded or decoded.
    #[error("audio node codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// No player exists for the guild.
    #[error("no active player for guild {0}")]
    NoPlayer(GuildId),

    /// Track resolution returned nothing.
    #[error("no tracks found for {0}")]
    NoTracks(String),
}
