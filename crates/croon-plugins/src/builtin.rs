//! Built-in plugins shipped with the bot.

use async_trait::async_trait;
use tracing::debug;

use croon_audio::AudioError;

use crate::errors::PluginError;
use crate::types::{CommandInvocation, Plugin, PluginContext, Reply};

/// `ping` — liveness check.
pub struct PingPlugin;

#[async_trait]
impl Plugin for PingPlugin {
    fn name(&self) -> &str {
        "ping"
    }

    fn commands(&self) -> &[&str] {
        &["ping"]
    }

    async fn handle_command(
        &self,
        ctx: &PluginContext,
        _invocation: &CommandInvocation,
    ) -> Result<Option<Reply>, PluginError> {
        Ok(Some(Reply::text(ctx.catalog.get("cmd.ping.reply"))))
    }
}

/// `uptime` — how long the process has been running.
pub struct UptimePlugin;

#[async_trait]
impl Plugin for UptimePlugin {
    fn name(&self) -> &str {
        "uptime"
    }

    fn commands(&self) -> &[&str] {
        &["uptime"]
    }

    async fn handle_command(
        &self,
        ctx: &PluginContext,
        _invocation: &CommandInvocation,
    ) -> Result<Option<Reply>, PluginError> {
        let minutes = ctx.started_at.elapsed().as_secs() / 60;
        Ok(Some(Reply::text(
            ctx.catalog.format("cmd.uptime.reply", &[&minutes.to_string()]),
        )))
    }
}

/// `prefix` — show or change the guild's command prefix.
pub struct PrefixPlugin;

/// Longest prefix a guild may configure.
const MAX_PREFIX_LEN: usize = 5;

#[async_trait]
impl Plugin for PrefixPlugin {
    fn name(&self) -> &str {
        "prefix"
    }

    fn commands(&self) -> &[&str] {
        &["prefix"]
    }

    async fn handle_command(
        &self,
        ctx: &PluginContext,
        invocation: &CommandInvocation,
    ) -> Result<Option<Reply>, PluginError> {
        let Some(guild) = invocation.message.guild_id else {
            return Ok(Some(Reply::text(ctx.catalog.get("error.not_in_guild"))));
        };

        match invocation.args.first() {
            None => {
                let prefix = ctx.effective_prefix(Some(guild))?;
                Ok(Some(Reply::text(
                    ctx.catalog.format("cmd.prefix.current", &[&prefix]),
                )))
            }
            Some(new_prefix) => {
                if new_prefix.is_empty()
                    || new_prefix.len() > MAX_PREFIX_LEN
                    || new_prefix.chars().any(char::is_whitespace)
                {
                    return Ok(Some(Reply::text(ctx.catalog.get("cmd.prefix.invalid"))));
                }
                ctx.storage.set_guild_prefix(guild, Some(new_prefix))?;
                Ok(Some(Reply::text(
                    ctx.catalog.format("cmd.prefix.updated", &[new_prefix]),
                )))
            }
        }
    }
}

/// `play` / `stop` / `volume` / `nowplaying` — voice playback control.
///
/// Reads player state through the registry accessor and drives playback
/// through the cluster bridge snapshot; it never mutates either registry
/// directly.
pub struct PlaybackPlugin;

/// Upper bound the nodes accept.
const MAX_VOLUME: u16 = 150;

#[async_trait]
impl Plugin for PlaybackPlugin {
    fn name(&self) -> &str {
        "playback"
    }

    fn commands(&self) -> &[&str] {
        &["play", "stop", "volume", "nowplaying"]
    }

    async fn handle_command(
        &self,
        ctx: &PluginContext,
        invocation: &CommandInvocation,
    ) -> Result<Option<Reply>, PluginError> {
        let Some(guild) = invocation.message.guild_id else {
            return Ok(Some(Reply::text(ctx.catalog.get("error.not_in_guild"))));
        };

        match invocation.name.as_str() {
            "play" => {
                let query = invocation.args.join(" ");
                if query.is_empty() {
                    return Ok(Some(Reply::text(ctx.catalog.get("cmd.play.usage"))));
                }
                let Some(bridge) = &ctx.bridge else {
                    return Ok(Some(Reply::text(ctx.catalog.get("cmd.play.no_session"))));
                };
                match bridge.play_identifier(guild, &query).await {
                    Ok(track) => {
                        ctx.storage.record_play(guild, &track.title)?;
                        Ok(Some(Reply::text(
                            ctx.catalog.format("cmd.play.now_playing", &[&track.title]),
                        )))
                    }
                    Err(AudioError::NoTracks(_)) => Ok(Some(Reply::text(
                        ctx.catalog.format("cmd.play.no_results", &[&query]),
                    ))),
                    Err(AudioError::NoPlayer(_)) => {
                        Ok(Some(Reply::text(ctx.catalog.get("cmd.play.no_session"))))
                    }
                    Err(err) => Err(PluginError::Failed(err.to_string())),
                }
            }

            "stop" => {
                let Some(bridge) = &ctx.bridge else {
                    return Ok(Some(Reply::text(ctx.catalog.get("cmd.nowplaying.none"))));
                };
                match bridge.stop(guild).await {
                    Ok(()) => Ok(Some(Reply::text(ctx.catalog.get("cmd.stop.reply")))),
                    Err(AudioError::NoPlayer(_)) => {
                        Ok(Some(Reply::text(ctx.catalog.get("cmd.nowplaying.none"))))
                    }
                    Err(err) => Err(PluginError::Failed(err.to_string())),
                }
            }

            "volume" => {
                let Some(volume) = invocation.args.first().and_then(|a| a.parse::<u16>().ok())
                else {
                    return Ok(Some(Reply::text(ctx.catalog.get("cmd.volume.invalid"))));
                };
                if volume > MAX_VOLUME {
                    return Ok(Some(Reply::text(ctx.catalog.get("cmd.volume.invalid"))));
                }
                ctx.storage.set_guild_volume(guild, volume)?;
                if let Some(bridge) = &ctx.bridge {
                    // Best-effort live update; the stored value is the
                    // durable one.
                    if let Err(error) = bridge.set_volume(guild, volume).await {
                        debug!(guild_id = %guild, %error, "live volume update skipped");
                    }
                }
                Ok(Some(Reply::text(
                    ctx.catalog.format("cmd.volume.reply", &[&volume.to_string()]),
                )))
            }

            "nowplaying" => match ctx.players.get(guild).and_then(|p| p.track) {
                Some(track) => Ok(Some(Reply::text(
                    ctx.catalog.format("cmd.nowplaying.reply", &[&track]),
                ))),
                None => Ok(Some(Reply::text(ctx.catalog.get("cmd.nowplaying.none")))),
            },

            other => {
                debug!(command = other, "playback plugin got unrouted command");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use serde_json::Value;

    use croon_audio::{Player, PlayerRegistry};
    use croon_core::redact::SecretRedactor;
    use croon_core::{ChannelId, GuildId, Message, NodeId, PacketSender, UserId};
    use croon_settings::TranslationCatalog;
    use croon_storage::StorageManager;

    struct NullSender;

    #[async_trait]
    impl PacketSender for NullSender {
        async fn send_packet(&self, _guild: GuildId, _payload: Value) {}
    }

    fn context() -> PluginContext {
        let storage = Arc::new(StorageManager::new(":memory:"));
        storage.connect().unwrap();
        PluginContext {
            storage,
            catalog: Arc::new(TranslationCatalog::builtin()),
            redactor: SecretRedactor::empty(),
            sender: Arc::new(NullSender),
            players: Arc::new(PlayerRegistry::new()),
            bridge: None,
            default_prefix: "!".to_string(),
            started_at: Instant::now(),
        }
    }

    fn invocation(name: &str, args: &[&str], guild: Option<GuildId>) -> CommandInvocation {
        CommandInvocation {
            name: name.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            message: Message {
                guild_id: guild,
                channel_id: ChannelId::new(2),
                author_id: UserId::new(3),
                author_bot: false,
                content: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let reply = PingPlugin
            .handle_command(&context(), &invocation("ping", &[], None))
            .await
            .unwrap();
        assert_eq!(reply, Some(Reply::text("Pong!")));
    }

    #[tokio::test]
    async fn uptime_reports_minutes() {
        let reply = UptimePlugin
            .handle_command(&context(), &invocation("uptime", &[], None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "Online for 0 minutes.");
    }

    #[tokio::test]
    async fn prefix_show_default() {
        let ctx = context();
        let reply = PrefixPlugin
            .handle_command(&ctx, &invocation("prefix", &[], Some(GuildId::new(1))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "The command prefix here is `!`.");
    }

    #[tokio::test]
    async fn prefix_set_and_read_back() {
        let ctx = context();
        let guild = GuildId::new(1);
        let reply = PrefixPlugin
            .handle_command(&ctx, &invocation("prefix", &["?"], Some(guild)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "Command prefix changed to `?`.");
        assert_eq!(ctx.effective_prefix(Some(guild)).unwrap(), "?");
    }

    #[tokio::test]
    async fn prefix_rejects_invalid() {
        let ctx = context();
        let reply = PrefixPlugin
            .handle_command(
                &ctx,
                &invocation("prefix", &["toolong"], Some(GuildId::new(1))),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "A prefix must be 1-5 characters with no spaces.");
    }

    #[tokio::test]
    async fn prefix_outside_guild_rejected() {
        let reply = PrefixPlugin
            .handle_command(&context(), &invocation("prefix", &[], None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "That command only works inside a server.");
    }

    #[tokio::test]
    async fn play_without_voice_session_prompts_summon() {
        // No bridge in context: the session is not ready for playback.
        let reply = PlaybackPlugin
            .handle_command(
                &context(),
                &invocation("play", &["some", "song"], Some(GuildId::new(1))),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "Summon me into a voice channel first.");
    }

    #[tokio::test]
    async fn play_without_query_shows_usage() {
        let reply = PlaybackPlugin
            .handle_command(&context(), &invocation("play", &[], Some(GuildId::new(1))))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "Tell me what to play.");
    }

    #[tokio::test]
    async fn nowplaying_reads_the_player_registry() {
        let ctx = context();
        let guild = GuildId::new(1);

        let reply = PlaybackPlugin
            .handle_command(&ctx, &invocation("nowplaying", &[], Some(guild)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "Nothing is playing right now.");

        let mut player = Player::new(guild, NodeId::new("n", 2333));
        player.track = Some("a great song".to_string());
        ctx.players.insert(player);

        let reply = PlaybackPlugin
            .handle_command(&ctx, &invocation("nowplaying", &[], Some(guild)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "Now playing: a great song");
    }

    #[tokio::test]
    async fn volume_persists_to_storage() {
        let ctx = context();
        let guild = GuildId::new(1);
        let reply = PlaybackPlugin
            .handle_command(&ctx, &invocation("volume", &["80"], Some(guild)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "Volume set to 80.");
        assert_eq!(ctx.storage.guild_settings(guild).unwrap().volume, 80);
    }

    #[tokio::test]
    async fn volume_rejects_out_of_range() {
        let ctx = context();
        for bad in ["200", "loud", ""] {
            let args: &[&str] = if bad.is_empty() { &[] } else { &[bad] };
            let reply = PlaybackPlugin
                .handle_command(&ctx, &invocation("volume", args, Some(GuildId::new(1))))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reply.content, "Volume must be between 0 and 150.");
        }
    }

    #[tokio::test]
    async fn playback_outside_guild_rejected() {
        let reply = PlaybackPlugin
            .handle_command(&context(), &invocation("play", &["x"], None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "That command only works inside a server.");
    }
}
