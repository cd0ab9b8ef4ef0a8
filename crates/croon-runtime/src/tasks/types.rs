//! Task trait and execution context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use croon_audio::PlayerRegistry;
use croon_core::{PacketSender, UserId};
use croon_gateway::GatewayHandle;
use croon_settings::TranslationCatalog;
use croon_storage::StorageManager;

/// A task failure, contained at the scheduler boundary.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task could not complete.
    #[error("{0}")]
    Failed(String),

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] croon_storage::StorageError),

    /// A gateway send failed.
    #[error(transparent)]
    Gateway(#[from] croon_gateway::GatewayError),
}

/// What a task runs against: the live-session slice of the orchestrator.
///
/// Rebuilt for every ready transition, so tasks always see the current
/// session identity and transport.
#[derive(Clone)]
pub struct TaskContext {
    /// Persistence surface.
    pub storage: Arc<StorageManager>,
    /// Guild-routed packet capability.
    pub sender: Arc<dyn PacketSender>,
    /// Active voice players (read-only for tasks).
    pub players: Arc<PlayerRegistry>,
    /// Response phrase lookup.
    pub catalog: Arc<TranslationCatalog>,
    /// The live gateway connection (shard-level sends, e.g. presence).
    pub handle: Arc<dyn GatewayHandle>,
    /// The bot's session identity.
    pub user_id: UserId,
}

/// A named unit of scheduled work. Immutable after registration; the
/// scheduler owns it until process exit.
#[async_trait]
pub trait TaskDescriptor: Send + Sync {
    /// Unique task name, used in logs and validation.
    fn name(&self) -> &str;

    /// Recurrence. `None` means run once per ready transition.
    fn interval(&self) -> Option<Duration> {
        None
    }

    /// Execute one run of the task.
    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError>;
}
