//! Storage manager: pool lifecycle + query surface.

use parking_lot::RwLock;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use croon_core::GuildId;

use crate::errors::StorageError;
use crate::migrations::run_migrations;

/// Per-guild configuration row, with defaults for absent guilds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuildSettings {
    /// Command prefix override; `None` falls back to the bot default.
    pub prefix: Option<String>,
    /// Locale override; `None` falls back to the bot default.
    pub locale: Option<String>,
    /// Playback volume, 0–150.
    pub volume: u16,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            prefix: None,
            locale: None,
            volume: 100,
        }
    }
}

/// Owns the SQLite session for the whole process.
///
/// Constructed disconnected; the orchestrator calls [`connect`] during
/// bootstrap and [`destroy`] during teardown. All query methods are
/// callable from any component holding a reference.
///
/// [`connect`]: StorageManager::connect
/// [`destroy`]: StorageManager::destroy
pub struct StorageManager {
    path: String,
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
}

impl StorageManager {
    /// Create a disconnected manager for the given database path.
    ///
    /// `:memory:` is accepted (the pool is then pinned to a single
    /// connection, since every new in-memory connection would otherwise
    /// be a fresh empty database).
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pool: RwLock::new(None),
        }
    }

    /// Establish the persistence session and run migrations.
    ///
    /// Idempotent: calling while connected is a no-op.
    pub fn connect(&self) -> Result<(), StorageError> {
        {
            let guard = self.pool.read();
            if guard.is_some() {
                debug!("storage already connected");
                return Ok(());
            }
        }

        let (manager, max_size) = if self.path == ":memory:" {
            (SqliteConnectionManager::memory(), 1)
        } else {
            (SqliteConnectionManager::file(&self.path), 8)
        };
        let pool = Pool::builder().max_size(max_size).build(manager)?;
        run_migrations(&*pool.get()?)?;

        let mut guard = self.pool.write();
        // A racing connect may have won; keep the first pool.
        if guard.is_none() {
            *guard = Some(pool);
            info!(path = %self.path, "storage connected");
        }
        Ok(())
    }

    /// Close the persistence session.
    ///
    /// Safe to call when never connected; connections drain as the pool
    /// drops.
    pub fn destroy(&self) {
        let dropped = self.pool.write().take();
        if dropped.is_some() {
            info!("storage disconnected");
        }
    }

    /// Whether a session is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.pool.read().is_some()
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        let guard = self.pool.read();
        let pool = guard.as_ref().ok_or(StorageError::NotConnected)?;
        Ok(pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Guild settings
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch a guild's settings; absent guilds get defaults.
    pub fn guild_settings(&self, guild: GuildId) -> Result<GuildSettings, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT prefix, locale, volume FROM guild_settings WHERE guild_id = ?1",
                params![guild.get() as i64],
                |row| {
                    Ok(GuildSettings {
                        prefix: row.get(0)?,
                        locale: row.get(1)?,
                        volume: row.get::<_, i64>(2)? as u16,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    /// Set or clear a guild's command prefix.
    pub fn set_guild_prefix(
        &self,
        guild: GuildId,
        prefix: Option<&str>,
    ) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let _ = conn.execute(
            "INSERT INTO guild_settings (guild_id, prefix) VALUES (?1, ?2)
             ON CONFLICT (guild_id) DO UPDATE SET prefix = excluded.prefix",
            params![guild.get() as i64, prefix],
        )?;
        Ok(())
    }

    /// Set a guild's playback volume.
    pub fn set_guild_volume(&self, guild: GuildId, volume: u16) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let _ = conn.execute(
            "INSERT INTO guild_settings (guild_id, volume) VALUES (?1, ?2)
             ON CONFLICT (guild_id) DO UPDATE SET volume = excluded.volume",
            params![guild.get() as i64, i64::from(volume)],
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Key-value scratch state (plugin surface)
    // ─────────────────────────────────────────────────────────────────────

    /// Read a KV entry.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Write a KV entry (upsert).
    pub fn kv_put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let _ = conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Playback stats
    // ─────────────────────────────────────────────────────────────────────

    /// Record one played track for a guild.
    pub fn record_play(&self, guild: GuildId, track: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let _ = conn.execute(
            "INSERT INTO play_history (guild_id, track) VALUES (?1, ?2)",
            params![guild.get() as i64, track],
        )?;
        Ok(())
    }

    /// Total tracks played across all guilds.
    pub fn play_count(&self) -> Result<u64, StorageError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT count(*) FROM play_history", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> StorageManager {
        let manager = StorageManager::new(":memory:");
        manager.connect().unwrap();
        manager
    }

    #[test]
    fn connect_is_idempotent() {
        let manager = connected();
        assert!(manager.is_connected());
        manager.connect().unwrap();
        assert!(manager.is_connected());
    }

    #[test]
    fn destroy_when_never_connected_is_noop() {
        let manager = StorageManager::new(":memory:");
        manager.destroy();
        assert!(!manager.is_connected());
    }

    #[test]
    fn queries_after_destroy_fail_cleanly() {
        let manager = connected();
        manager.destroy();
        assert!(matches!(
            manager.guild_settings(GuildId::new(1)),
            Err(StorageError::NotConnected)
        ));
    }

    #[test]
    fn absent_guild_gets_defaults() {
        let manager = connected();
        let settings = manager.guild_settings(GuildId::new(42)).unwrap();
        assert_eq!(settings, GuildSettings::default());
        assert_eq!(settings.volume, 100);
    }

    #[test]
    fn prefix_roundtrip() {
        let manager = connected();
        let guild = GuildId::new(42);
        manager.set_guild_prefix(guild, Some("?")).unwrap();
        assert_eq!(
            manager.guild_settings(guild).unwrap().prefix.as_deref(),
            Some("?")
        );
        manager.set_guild_prefix(guild, None).unwrap();
        assert_eq!(manager.guild_settings(guild).unwrap().prefix, None);
    }

    #[test]
    fn volume_upsert_preserves_prefix() {
        let manager = connected();
        let guild = GuildId::new(7);
        manager.set_guild_prefix(guild, Some(">")).unwrap();
        manager.set_guild_volume(guild, 80).unwrap();
        let settings = manager.guild_settings(guild).unwrap();
        assert_eq!(settings.prefix.as_deref(), Some(">"));
        assert_eq!(settings.volume, 80);
    }

    #[test]
    fn kv_roundtrip() {
        let manager = connected();
        assert_eq!(manager.kv_get("missing").unwrap(), None);
        manager.kv_put("k", "v1").unwrap();
        manager.kv_put("k", "v2").unwrap();
        assert_eq!(manager.kv_get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn play_stats_accumulate() {
        let manager = connected();
        manager.record_play(GuildId::new(1), "track a").unwrap();
        manager.record_play(GuildId::new(2), "track b").unwrap();
        assert_eq!(manager.play_count().unwrap(), 2);
    }

    #[test]
    fn file_backed_database_persists_across_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("croon.db");
        let manager = StorageManager::new(path.to_string_lossy().to_string());
        manager.connect().unwrap();
        manager.kv_put("boot", "1").unwrap();
        manager.destroy();

        manager.connect().unwrap();
        assert_eq!(manager.kv_get("boot").unwrap().as_deref(), Some("1"));
    }
}
