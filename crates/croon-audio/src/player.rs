//! Per-guild player state.

use dashmap::DashMap;
use metrics::gauge;
use serde::Serialize;

use croon_core::{ChannelId, GuildId, NodeId};

/// Playback state for one guild's voice session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Owning guild.
    pub guild_id: GuildId,
    /// Node serving this player.
    pub node: NodeId,
    /// Voice channel the bot sits in.
    pub channel_id: Option<ChannelId>,
    /// Currently playing track identifier, if any.
    pub track: Option<String>,
    /// Whether playback is paused.
    pub paused: bool,
    /// Volume, 0–150.
    pub volume: u16,
    /// Playback position reported by the node.
    pub position_ms: u64,
}

impl Player {
    /// A fresh player on `node` for `guild_id`.
    #[must_use]
    pub fn new(guild_id: GuildId, node: NodeId) -> Self {
        Self {
            guild_id,
            node,
            channel_id: None,
            track: None,
            paused: false,
            volume: 100,
            position_ms: 0,
        }
    }
}

/// Guild → player map. Invariant: at most one player per guild — an
/// insert for an existing guild replaces, never appends.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Player>,
}

impl PlayerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
        }
    }

    /// Insert (or replace) the guild's player.
    pub fn insert(&self, player: Player) {
        let _ = self.players.insert(player.guild_id, player);
        self.record_gauge();
    }

    /// Snapshot of a guild's player.
    #[must_use]
    pub fn get(&self, guild: GuildId) -> Option<Player> {
        self.players.get(&guild).map(|p| p.clone())
    }

    /// Remove a guild's player, returning it.
    pub fn remove(&self, guild: GuildId) -> Option<Player> {
        let removed = self.players.remove(&guild).map(|(_, p)| p);
        self.record_gauge();
        removed
    }

    /// Mutate a guild's player in place; `false` when absent.
    pub fn update(&self, guild: GuildId, mutate: impl FnOnce(&mut Player)) -> bool {
        match self.players.get_mut(&guild) {
            Some(mut entry) => {
                mutate(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Number of active players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether no players are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players currently served by `node`.
    #[must_use]
    pub fn count_on_node(&self, node: &NodeId) -> usize {
        self.players.iter().filter(|p| &p.node == node).count()
    }

    /// Guilds with an active player (stable order not guaranteed).
    #[must_use]
    pub fn guilds(&self) -> Vec<GuildId> {
        self.players.iter().map(|p| *p.key()).collect()
    }

    fn record_gauge(&self) {
        gauge!("audio_players_active").set(self.players.len() as f64);
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId::new("localhost", 2333)
    }

    #[test]
    fn one_player_per_guild() {
        let registry = PlayerRegistry::new();
        let guild = GuildId::new(1);
        registry.insert(Player::new(guild, node()));
        registry.insert(Player {
            volume: 50,
            ..Player::new(guild, node())
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(guild).unwrap().volume, 50);
    }

    #[test]
    fn remove_returns_player() {
        let registry = PlayerRegistry::new();
        let guild = GuildId::new(1);
        registry.insert(Player::new(guild, node()));
        assert!(registry.remove(guild).is_some());
        assert!(registry.remove(guild).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn update_in_place() {
        let registry = PlayerRegistry::new();
        let guild = GuildId::new(1);
        registry.insert(Player::new(guild, node()));
        assert!(registry.update(guild, |p| p.position_ms = 5000));
        assert_eq!(registry.get(guild).unwrap().position_ms, 5000);
        assert!(!registry.update(GuildId::new(2), |p| p.position_ms = 1));
    }

    #[test]
    fn count_on_node_filters() {
        let registry = PlayerRegistry::new();
        let near = NodeId::new("near", 2333);
        let far = NodeId::new("far", 2333);
        registry.insert(Player::new(GuildId::new(1), near.clone()));
        registry.insert(Player::new(GuildId::new(2), near.clone()));
        registry.insert(Player::new(GuildId::new(3), far.clone()));
        assert_eq!(registry.count_on_node(&near), 2);
        assert_eq!(registry.count_on_node(&far), 1);
    }
}
