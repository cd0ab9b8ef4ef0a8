//! Inbound gateway event types.
//!
//! [`GatewayEvent`] is the decoded session event stream: the transport
//! layer turns opaque wire frames into these variants and everything
//! above it (dispatcher, plugins, audio bridge) consumes them. Events are
//! broadcast in-process and never persisted.

use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, GuildId, ShardId, UserId};

/// An inbound chat message, trimmed to the fields the runtime needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Guild the message was sent in; `None` for direct messages.
    pub guild_id: Option<GuildId>,
    /// Channel the message was sent in.
    pub channel_id: ChannelId,
    /// Author account.
    pub author_id: UserId,
    /// Whether the author is a bot account (bot traffic is never dispatched).
    pub author_bot: bool,
    /// Raw message text.
    pub content: String,
}

/// Session lifecycle and dispatch events from the remote gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Session identified; fires once per successful (re)connection.
    Ready {
        /// The bot's own account id.
        user_id: UserId,
        /// Token for this session (resumable handle, treated as a secret).
        session_token: String,
        /// Number of shards the session was split into.
        shard_count: u32,
    },

    /// Session resumed after a transport-level drop.
    Resumed,

    /// A chat message arrived.
    MessageCreate {
        /// The decoded message.
        message: Message,
    },

    /// A user's voice channel membership changed.
    VoiceStateUpdate {
        /// Guild the update applies to.
        guild_id: GuildId,
        /// User whose state changed.
        user_id: UserId,
        /// Channel joined, or `None` on leave.
        channel_id: Option<ChannelId>,
        /// Platform voice session id.
        session_id: String,
    },

    /// The platform assigned/moved a guild's voice server.
    VoiceServerUpdate {
        /// Guild the update applies to.
        guild_id: GuildId,
        /// Voice connection token.
        token: String,
        /// Voice server endpoint; `None` while the server is allocating.
        endpoint: Option<String>,
    },

    /// A guild became available on this session.
    GuildCreate {
        /// The guild.
        guild_id: GuildId,
    },

    /// A guild became unavailable or removed the bot.
    GuildDelete {
        /// The guild.
        guild_id: GuildId,
    },

    /// A shard's transport dropped; the platform will re-establish it.
    ShardDisconnected {
        /// The shard that dropped.
        shard: ShardId,
        /// Close code, when the transport reported one.
        code: Option<u16>,
    },
}

impl GatewayEvent {
    /// The event type string (for logging and type discrimination).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Resumed => "resumed",
            Self::MessageCreate { .. } => "message_create",
            Self::VoiceStateUpdate { .. } => "voice_state_update",
            Self::VoiceServerUpdate { .. } => "voice_server_update",
            Self::GuildCreate { .. } => "guild_create",
            Self::GuildDelete { .. } => "guild_delete",
            Self::ShardDisconnected { .. } => "shard_disconnected",
        }
    }

    /// The guild this event belongs to, when it is guild-scoped.
    #[must_use]
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::MessageCreate { message } => message.guild_id,
            Self::VoiceStateUpdate { guild_id, .. }
            | Self::VoiceServerUpdate { guild_id, .. }
            | Self::GuildCreate { guild_id }
            | Self::GuildDelete { guild_id } => Some(*guild_id),
            _ => None,
        }
    }
}

/// Create a message event (test and transport convenience).
#[must_use]
pub fn message_event(
    guild_id: GuildId,
    channel_id: ChannelId,
    author_id: UserId,
    content: impl Into<String>,
) -> GatewayEvent {
    GatewayEvent::MessageCreate {
        message: Message {
            guild_id: Some(guild_id),
            channel_id,
            author_id,
            author_bot: false,
            content: content.into(),
        },
    }
}
