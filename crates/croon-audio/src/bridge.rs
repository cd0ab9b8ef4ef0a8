//! The cluster bridge: session-bound voice routing.
//!
//! Constructed once the session is ready (and re-constructed — replaced,
//! never appended — after every reconnect). Owns the node pool for its
//! lifetime; the [`PlayerRegistry`] is shared with the orchestrator so
//! players on unaffected guilds survive a bridge rebuild.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use croon_core::{ChannelId, GatewayEvent, GuildId, PacketSender, UserId};
use croon_settings::NodeSettings;

use crate::errors::AudioError;
use crate::node::{NodeConnection, NodeEvent};
use crate::player::{Player, PlayerRegistry};

/// A guild's half-finished voice handshake: the platform delivers state
/// and server updates independently and in either order.
#[derive(Default)]
struct PendingVoice {
    channel_id: Option<ChannelId>,
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
}

impl PendingVoice {
    fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.token.is_some() && self.endpoint.is_some()
    }
}

/// Routes voice-control traffic between the shard transport and the
/// audio nodes, and maintains the player registry as sessions open and
/// close.
pub struct ClusterBridge {
    user_id: UserId,
    nodes: Vec<Arc<NodeConnection>>,
    players: Arc<PlayerRegistry>,
    sender: Arc<dyn PacketSender>,
    pending: DashMap<GuildId, PendingVoice>,
    cancel: CancellationToken,
}

impl ClusterBridge {
    /// Register the configured nodes and start their event pumps.
    ///
    /// A node that cannot connect stays registered-but-unavailable and
    /// retries on its own; it never blocks construction or its peers.
    #[must_use]
    pub fn new(
        user_id: UserId,
        node_settings: &[NodeSettings],
        players: Arc<PlayerRegistry>,
        sender: Arc<dyn PacketSender>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let nodes: Vec<Arc<NodeConnection>> = node_settings
            .iter()
            .map(|settings| NodeConnection::start(settings.clone(), user_id))
            .collect();

        for node in &nodes {
            drop(tokio::spawn(pump_node_events(
                Arc::clone(node),
                Arc::clone(&players),
                cancel.clone(),
            )));
        }
        info!(nodes = nodes.len(), "audio cluster bridge constructed");

        Self {
            user_id,
            nodes,
            players,
            sender,
            pending: DashMap::new(),
            cancel,
        }
    }

    /// Feed a gateway event through the bridge's voice routing.
    ///
    /// Only voice-related events are interpreted; everything else is a
    /// no-op so the dispatcher can forward unconditionally.
    pub async fn handle_event(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::VoiceStateUpdate {
                guild_id,
                user_id,
                channel_id,
                session_id,
            } if *user_id == self.user_id => match channel_id {
                Some(channel) => {
                    {
                        let mut pending = self.pending.entry(*guild_id).or_default();
                        pending.channel_id = Some(*channel);
                        pending.session_id = Some(session_id.clone());
                    }
                    self.try_complete_handshake(*guild_id).await;
                }
                None => self.close_player(*guild_id).await,
            },
            GatewayEvent::VoiceServerUpdate {
                guild_id,
                token,
                endpoint,
            } => {
                {
                    let mut pending = self.pending.entry(*guild_id).or_default();
                    pending.token = Some(token.clone());
                    pending.endpoint.clone_from(endpoint);
                }
                self.try_complete_handshake(*guild_id).await;
            }
            GatewayEvent::GuildDelete { guild_id } => self.close_player(*guild_id).await,
            _ => {}
        }
    }

    /// Ask the platform to join a voice channel (fire-and-forget: the
    /// shard may legitimately be unmapped mid-reconnect).
    pub async fn join_channel(&self, guild: GuildId, channel: ChannelId) {
        self.sender
            .send_packet(
                guild,
                json!({
                    "op": 4,
                    "d": {
                        "guild_id": guild,
                        "channel_id": channel,
                        "self_mute": false,
                        "self_deaf": true,
                    },
                }),
            )
            .await;
    }

    /// Ask the platform to leave a guild's voice channel.
    pub async fn leave_channel(&self, guild: GuildId) {
        self.sender
            .send_packet(
                guild,
                json!({
                    "op": 4,
                    "d": {
                        "guild_id": guild,
                        "channel_id": Value::Null,
                        "self_mute": false,
                        "self_deaf": false,
                    },
                }),
            )
            .await;
        self.close_player(guild).await;
    }

    /// Start playback on a guild's player.
    pub async fn play(&self, guild: GuildId, track: &str) -> Result<(), AudioError> {
        let player = self.players.get(guild).ok_or(AudioError::NoPlayer(guild))?;
        let node = self
            .node_by_id(&player.node)
            .ok_or_else(|| AudioError::NodeUnavailable(player.node.clone()))?;
        node.send_op(json!({
            "op": "play",
            "guildId": guild,
            "track": track,
        }))
        .await?;
        let _ = self.players.update(guild, |p| {
            p.track = Some(track.to_string());
            p.paused = false;
            p.position_ms = 0;
        });
        Ok(())
    }

    /// Resolve an identifier on the guild's node and start playing the
    /// first match. Returns the resolved track.
    pub async fn play_identifier(
        &self,
        guild: GuildId,
        identifier: &str,
    ) -> Result<crate::node::TrackInfo, AudioError> {
        let player = self.players.get(guild).ok_or(AudioError::NoPlayer(guild))?;
        let node = self
            .node_by_id(&player.node)
            .ok_or_else(|| AudioError::NodeUnavailable(player.node.clone()))?;
        let tracks = node.resolve_tracks(identifier).await?;
        let track = tracks
            .into_iter()
            .next()
            .ok_or_else(|| AudioError::NoTracks(identifier.to_string()))?;
        self.play(guild, &track.track).await?;
        Ok(track)
    }

    /// Stop playback on a guild's player.
    pub async fn stop(&self, guild: GuildId) -> Result<(), AudioError> {
        let player = self.players.get(guild).ok_or(AudioError::NoPlayer(guild))?;
        let node = self
            .node_by_id(&player.node)
            .ok_or_else(|| AudioError::NodeUnavailable(player.node.clone()))?;
        node.send_op(json!({"op": "stop", "guildId": guild})).await?;
        let _ = self.players.update(guild, |p| p.track = None);
        Ok(())
    }

    /// Change a guild player's volume.
    pub async fn set_volume(&self, guild: GuildId, volume: u16) -> Result<(), AudioError> {
        let player = self.players.get(guild).ok_or(AudioError::NoPlayer(guild))?;
        let node = self
            .node_by_id(&player.node)
            .ok_or_else(|| AudioError::NodeUnavailable(player.node.clone()))?;
        node.send_op(json!({"op": "volume", "guildId": guild, "volume": volume}))
            .await?;
        let _ = self.players.update(guild, |p| p.volume = volume);
        Ok(())
    }

    /// The node serving a guild, or the best candidate for a new player:
    /// fewest players among available nodes, registration order breaking
    /// ties.
    #[must_use]
    pub fn node_for(&self, guild: GuildId) -> Option<Arc<NodeConnection>> {
        if let Some(player) = self.players.get(guild) {
            if let Some(node) = self.node_by_id(&player.node) {
                return Some(node);
            }
        }
        self.nodes
            .iter()
            .filter(|n| n.is_available())
            .min_by_key(|n| self.players.count_on_node(n.id()))
            .cloned()
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes whose control channel is currently up.
    #[must_use]
    pub fn available_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_available()).count()
    }

    /// Whether this bridge was shut down (dropped or replaced).
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop event pumps and close every node connection.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        for node in &self.nodes {
            node.shutdown();
        }
        info!("audio cluster bridge shut down");
    }

    fn node_by_id(&self, id: &croon_core::NodeId) -> Option<Arc<NodeConnection>> {
        self.nodes
            .iter()
            .find(|n| n.id() == id && n.is_available())
            .cloned()
    }

    /// Forward the completed handshake to a node and open the player.
    async fn try_complete_handshake(&self, guild: GuildId) {
        let (channel, session_id, token, endpoint) = {
            let Some(pending) = self.pending.get(&guild) else {
                return;
            };
            if !pending.is_complete() {
                return;
            }
            (
                pending.channel_id,
                pending.session_id.clone(),
                pending.token.clone(),
                pending.endpoint.clone(),
            )
        };

        let Some(node) = self.node_for(guild) else {
            warn!(guild_id = %guild, "voice handshake complete but no audio node available");
            return;
        };

        let op = json!({
            "op": "voiceUpdate",
            "guildId": guild,
            "sessionId": session_id,
            "event": {"token": token, "endpoint": endpoint},
        });
        match node.send_op(op).await {
            Ok(()) => {
                let mut player = self
                    .players
                    .get(guild)
                    .unwrap_or_else(|| Player::new(guild, node.id().clone()));
                player.node = node.id().clone();
                player.channel_id = channel;
                self.players.insert(player);
                debug!(guild_id = %guild, node = %node.id(), "voice session routed to node");
            }
            Err(error) => {
                warn!(guild_id = %guild, node = %node.id(), %error, "failed to route voice session");
            }
        }
    }

    /// Tear down a guild's player (voice leave, guild gone).
    async fn close_player(&self, guild: GuildId) {
        let _ = self.pending.remove(&guild);
        let Some(player) = self.players.remove(guild) else {
            return;
        };
        if let Some(node) = self.node_by_id(&player.node) {
            if let Err(error) = node.send_op(json!({"op": "destroy", "guildId": guild})).await {
                debug!(guild_id = %guild, %error, "destroy op not delivered");
            }
        }
        debug!(guild_id = %guild, "player closed");
    }
}

impl Drop for ClusterBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Apply one node's control events to the shared player registry.
async fn pump_node_events(
    node: Arc<NodeConnection>,
    players: Arc<PlayerRegistry>,
    cancel: CancellationToken,
) {
    let mut events = node.events();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(NodeEvent::PlayerUpdate { guild_id, position_ms }) => {
                    let _ = players.update(guild_id, |p| p.position_ms = position_ms);
                }
                Ok(NodeEvent::TrackEnd { guild_id, track, reason }) => {
                    debug!(guild_id = %guild_id, %reason, "track ended");
                    let _ = players.update(guild_id, |p| {
                        if p.track.as_deref() == Some(track.as_str()) {
                            p.track = None;
                        }
                    });
                }
                Ok(NodeEvent::Stats { players: count, cpu_load }) => {
                    debug!(node = %node.id(), players = count, cpu_load, "node stats");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(node = %node.id(), skipped, "node event pump lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
