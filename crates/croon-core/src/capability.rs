//! Narrow capability interfaces.
//!
//! Components receive exactly the capability they need from the
//! orchestrator (a packet sender, a logger, a task source) instead of a
//! reference back to the whole client. The orchestrator implements these;
//! everything else consumes them.

use async_trait::async_trait;
use serde_json::Value;

use crate::ids::GuildId;

/// Sends an outbound packet over the shard currently serving a guild.
///
/// Fire-and-forget by contract: when no shard is mapped for the guild
/// (which legitimately happens mid-reconnect), the packet is silently
/// dropped — not an error, not a retry.
#[async_trait]
pub trait PacketSender: Send + Sync {
    /// Route `payload` to the guild's shard transport, if one is mapped.
    async fn send_packet(&self, guild: GuildId, payload: Value);
}
