//! Runtime error type.

use thiserror::Error;

/// Failures surfaced by the orchestration layer.
///
/// Only bootstrap-time errors propagate out of the client; everything
/// after a successful bootstrap is contained at a component boundary and
/// logged instead.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration is unusable (missing credential, bad node entry).
    #[error(transparent)]
    Settings(#[from] croon_settings::SettingsError),

    /// Foundation-layer failure (state machine, redaction pattern).
    #[error(transparent)]
    Core(#[from] croon_core::CoreError),

    /// The gateway session could not be opened.
    #[error(transparent)]
    Gateway(#[from] croon_gateway::GatewayError),

    /// The storage session could not be established.
    #[error(transparent)]
    Storage(#[from] croon_storage::StorageError),

    /// Scheduler registration rejected the task set.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// `bootstrap` was called while a session already exists.
    #[error("client is already running")]
    AlreadyRunning,
}
