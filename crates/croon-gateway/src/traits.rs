//! The seam between the orchestrator and the remote platform.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use croon_core::{GatewayEvent, GuildId, ShardId, UserId};

use crate::errors::GatewayError;

/// Identity of a live session, known once the platform sends `ready`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// The bot's own account id.
    pub user_id: UserId,
    /// Resumable session token. Treated as a secret: it joins the
    /// redaction set the moment it is known.
    pub session_token: String,
    /// Number of shards the session was split into.
    pub shard_count: u32,
}

/// A gateway implementation: credential in, connected session out.
///
/// Everything below this trait (wire protocol, heartbeats, resumes) is
/// an external-collaborator concern.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open an authenticated session.
    ///
    /// Resolves when the transport reports *connected*; the `ready`
    /// event arrives asynchronously on the event stream.
    async fn connect(
        &self,
        token: &str,
        shard_count: u32,
    ) -> Result<std::sync::Arc<dyn GatewayHandle>, GatewayError>;
}

/// A live authenticated connection.
#[async_trait]
pub trait GatewayHandle: Send + Sync {
    /// Subscribe to the inbound event stream.
    ///
    /// The channel is bounded; a lagging subscriber observes `Lagged`
    /// rather than blocking the transport.
    fn events(&self) -> broadcast::Receiver<GatewayEvent>;

    /// Session identity; `None` until the first `ready` arrives.
    fn session(&self) -> Option<SessionInfo>;

    /// Resolve the shard currently serving a guild.
    ///
    /// `None` means the guild is not mapped right now (e.g. its shard is
    /// mid-reconnect); callers treat that as "drop the operation".
    fn shard_for(&self, guild: GuildId) -> Option<ShardId>;

    /// Send an opaque payload over a shard's transport.
    async fn send(&self, shard: ShardId, payload: Value) -> Result<(), GatewayError>;

    /// Close the session without auto-reconnect.
    async fn disconnect(&self);
}

impl std::fmt::Debug for dyn GatewayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GatewayHandle")
    }
}
