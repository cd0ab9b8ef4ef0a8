//! Guild → shard routing table.

use std::collections::HashMap;

use parking_lot::RwLock;

use croon_core::{GuildId, ShardId};

/// Tracks which shard currently serves each guild.
///
/// Guilds are assigned as they become available (`guild_create`) and
/// unmapped when they go away or their shard drops. A miss is a defined
/// outcome, not an error: callers no-op on `None`.
pub struct ShardMap {
    shard_count: u32,
    assignments: RwLock<HashMap<GuildId, ShardId>>,
}

impl ShardMap {
    /// Create an empty map for a session with `shard_count` shards.
    #[must_use]
    pub fn new(shard_count: u32) -> Self {
        Self {
            shard_count: shard_count.max(1),
            assignments: RwLock::new(HashMap::new()),
        }
    }

    /// Assign a guild to its shard and return it.
    ///
    /// Placement uses the platform's fixed formula
    /// `(guild >> 22) % shard_count`, so re-assignment after a reconnect
    /// lands on the same shard.
    pub fn assign(&self, guild: GuildId) -> ShardId {
        let shard = ShardId::new(((guild.get() >> 22) % u64::from(self.shard_count)) as u32);
        let _ = self.assignments.write().insert(guild, shard);
        shard
    }

    /// Current shard for a guild, if mapped.
    #[must_use]
    pub fn get(&self, guild: GuildId) -> Option<ShardId> {
        self.assignments.read().get(&guild).copied()
    }

    /// Unmap a single guild.
    pub fn remove(&self, guild: GuildId) {
        let _ = self.assignments.write().remove(&guild);
    }

    /// Unmap every guild served by a dropped shard.
    pub fn remove_shard(&self, shard: ShardId) {
        self.assignments.write().retain(|_, s| *s != shard);
    }

    /// Number of currently mapped guilds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.read().len()
    }

    /// Whether no guilds are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.read().is_empty()
    }

    /// The session's shard count.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_is_deterministic() {
        let map = ShardMap::new(4);
        let guild = GuildId::new(1 << 23);
        let first = map.assign(guild);
        map.remove(guild);
        let second = map.assign(guild);
        assert_eq!(first, second);
    }

    #[test]
    fn unmapped_guild_returns_none() {
        let map = ShardMap::new(2);
        assert_eq!(map.get(GuildId::new(99)), None);
    }

    #[test]
    fn assign_within_shard_count() {
        let map = ShardMap::new(3);
        for raw in [0u64, 1 << 22, 2 << 22, 3 << 22, 77 << 22] {
            let shard = map.assign(GuildId::new(raw));
            assert!(shard.get() < 3);
        }
    }

    #[test]
    fn remove_shard_unmaps_its_guilds_only() {
        let map = ShardMap::new(2);
        // (guild >> 22) % 2 — even pages land on shard 0, odd on shard 1.
        let on_zero = GuildId::new(0);
        let on_one = GuildId::new(1 << 22);
        assert_eq!(map.assign(on_zero), ShardId::new(0));
        assert_eq!(map.assign(on_one), ShardId::new(1));

        map.remove_shard(ShardId::new(0));
        assert_eq!(map.get(on_zero), None);
        assert_eq!(map.get(on_one), Some(ShardId::new(1)));
    }

    #[test]
    fn zero_shard_count_clamped() {
        let map = ShardMap::new(0);
        assert_eq!(map.shard_count(), 1);
        let _ = map.assign(GuildId::new(5));
        assert_eq!(map.len(), 1);
    }
}
