//! Built-in scheduled tasks.

use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use serde_json::json;
use tracing::debug;

use croon_core::ShardId;

use crate::tasks::types::{TaskContext, TaskDescriptor, TaskError};

/// Periodically refreshes the bot's presence on shard 0.
pub struct PresenceTask {
    interval: Duration,
    status: String,
}

impl PresenceTask {
    /// Create a presence task with the configured refresh interval.
    #[must_use]
    pub fn new(interval_secs: u64, status: impl Into<String>) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(30)),
            status: status.into(),
        }
    }
}

#[async_trait]
impl TaskDescriptor for PresenceTask {
    fn name(&self) -> &str {
        "presence"
    }

    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        // Presence is session-scoped; the platform takes it on shard 0.
        ctx.handle
            .send(
                ShardId::new(0),
                json!({
                    "op": 3,
                    "d": {"status": "online", "activity": {"name": self.status}},
                }),
            )
            .await?;
        debug!(status = %self.status, "presence refreshed");
        Ok(())
    }
}

/// Periodically snapshots playback stats into storage and metrics.
pub struct StatsTask {
    interval: Duration,
}

impl StatsTask {
    /// Create a stats task with the given snapshot interval.
    #[must_use]
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(30)),
        }
    }
}

#[async_trait]
impl TaskDescriptor for StatsTask {
    fn name(&self) -> &str {
        "stats"
    }

    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let total_plays = ctx.storage.play_count()?;
        ctx.storage
            .kv_put("stats.plays.total", &total_plays.to_string())?;
        gauge!("playback_total_tracks").set(total_plays as f64);
        gauge!("audio_players_snapshot").set(ctx.players.len() as f64);
        debug!(total_plays, players = ctx.players.len(), "stats snapshot");
        Ok(())
    }
}
