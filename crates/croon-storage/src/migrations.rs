//! Versioned schema migrations, run inside `connect()`.

use rusqlite::Connection;
use tracing::info;

use crate::errors::StorageError;

/// Ordered migration steps; index + 1 is the schema version.
const MIGRATIONS: &[&str] = &[
    // v1: guild settings + generic KV
    "CREATE TABLE guild_settings (
        guild_id INTEGER PRIMARY KEY,
        prefix   TEXT,
        locale   TEXT,
        volume   INTEGER NOT NULL DEFAULT 100
    );
    CREATE TABLE kv (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );",
    // v2: playback history for the stats task
    "CREATE TABLE play_history (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id  INTEGER NOT NULL,
        track     TEXT NOT NULL,
        played_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );
    CREATE INDEX idx_play_history_guild ON play_history (guild_id);",
];

/// Bring the schema up to the current version.
///
/// Uses SQLite's `user_version` pragma as the version marker, so a fresh
/// database runs every step and an up-to-date one runs none.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as u32;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .map_err(|source| StorageError::Migration { version, source })?;
        conn.pragma_update(None, "user_version", version)
            .map_err(|source| StorageError::Migration { version, source })?;
        info!(version, "applied storage migration");
    }
    Ok(())
}

/// Current schema version of this build.
#[must_use]
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}
