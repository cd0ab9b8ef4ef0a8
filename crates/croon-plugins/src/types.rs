//! Plugin trait and dispatch context.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use croon_audio::{ClusterBridge, PlayerRegistry};
use croon_core::redact::SecretRedactor;
use croon_core::{GatewayEvent, Message, PacketSender};
use croon_settings::TranslationCatalog;
use croon_storage::StorageManager;

use crate::errors::PluginError;

/// A parsed command: prefix stripped, name lowered, args split on
/// whitespace.
#[derive(Clone, Debug)]
pub struct CommandInvocation {
    /// Command name, lowercase.
    pub name: String,
    /// Remaining whitespace-separated arguments.
    pub args: Vec<String>,
    /// The message that carried the command.
    pub message: Message,
}

impl CommandInvocation {
    /// Parse `content` against `prefix`; `None` when it is not a command.
    #[must_use]
    pub fn parse(prefix: &str, message: &Message) -> Option<Self> {
        let rest = message.content.strip_prefix(prefix)?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?.to_lowercase();
        Some(Self {
            name,
            args: parts.map(str::to_string).collect(),
            message: message.clone(),
        })
    }
}

/// A user-visible text response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// Reply text. Redacted at the send boundary, so handlers may embed
    /// whatever they produced.
    pub content: String,
}

impl Reply {
    /// Build a text reply.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// The capability set handlers run with.
///
/// Everything here is either read-only or self-serializing, so contexts
/// are cheap to clone and safe to share across concurrent dispatches.
#[derive(Clone)]
pub struct PluginContext {
    /// Persistence surface.
    pub storage: Arc<StorageManager>,
    /// Response phrase lookup.
    pub catalog: Arc<TranslationCatalog>,
    /// Secret scrubber for anything leaving the process.
    pub redactor: SecretRedactor,
    /// Outbound packet capability (fire-and-forget).
    pub sender: Arc<dyn PacketSender>,
    /// Active voice players. Read-only for handlers; only the bridge
    /// opens and closes entries.
    pub players: Arc<PlayerRegistry>,
    /// The cluster bridge, present while the session is ready. A
    /// snapshot taken at dispatch time, so a reconnect mid-command keeps
    /// the handler on a consistent bridge.
    pub bridge: Option<Arc<ClusterBridge>>,
    /// The bot-wide default command prefix.
    pub default_prefix: String,
    /// Process start time, for uptime-style commands.
    pub started_at: Instant,
}

impl PluginContext {
    /// The effective prefix for a guild: stored override or default.
    pub fn effective_prefix(
        &self,
        guild: Option<croon_core::GuildId>,
    ) -> Result<String, PluginError> {
        let Some(guild) = guild else {
            return Ok(self.default_prefix.clone());
        };
        let settings = self.storage.guild_settings(guild)?;
        Ok(settings.prefix.unwrap_or_else(|| self.default_prefix.clone()))
    }
}

/// An independently authored command/event handler unit.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin name, used in logs.
    fn name(&self) -> &str;

    /// Command names this plugin serves (lowercase).
    fn commands(&self) -> &[&str] {
        &[]
    }

    /// Handle one of this plugin's commands.
    ///
    /// `Ok(None)` means "handled, nothing to say".
    async fn handle_command(
        &self,
        _ctx: &PluginContext,
        _invocation: &CommandInvocation,
    ) -> Result<Option<Reply>, PluginError> {
        Ok(None)
    }

    /// Observe a gateway event. Default: ignore.
    async fn on_event(
        &self,
        _ctx: &PluginContext,
        _event: &GatewayEvent,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croon_core::{ChannelId, GuildId, UserId};

    fn message(content: &str) -> Message {
        Message {
            guild_id: Some(GuildId::new(1)),
            channel_id: ChannelId::new(2),
            author_id: UserId::new(3),
            author_bot: false,
            content: content.to_string(),
        }
    }

    #[test]
    fn parse_command_with_args() {
        let inv = CommandInvocation::parse("!", &message("!Play some song")).unwrap();
        assert_eq!(inv.name, "play");
        assert_eq!(inv.args, vec!["some", "song"]);
    }

    #[test]
    fn parse_rejects_non_command() {
        assert!(CommandInvocation::parse("!", &message("hello there")).is_none());
    }

    #[test]
    fn parse_rejects_bare_prefix() {
        assert!(CommandInvocation::parse("!", &message("!")).is_none());
        assert!(CommandInvocation::parse("!", &message("!   ")).is_none());
    }

    #[test]
    fn parse_multichar_prefix() {
        let inv = CommandInvocation::parse("c!", &message("c!ping")).unwrap();
        assert_eq!(inv.name, "ping");
        assert!(inv.args.is_empty());
    }
}
