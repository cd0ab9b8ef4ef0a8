//! Task scheduler: ready-deferred execution with failure isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::errors::RuntimeError;
use crate::tasks::types::{TaskContext, TaskDescriptor};

/// Holds the registered task set and drives execution once the session
/// is ready.
pub struct Scheduler {
    tasks: Vec<Arc<dyn TaskDescriptor>>,
    started: AtomicBool,
    /// Token guarding the interval loops of the current ready epoch.
    loops: Mutex<Option<CancellationToken>>,
}

impl Scheduler {
    /// Create a scheduler over a fixed task set.
    #[must_use]
    pub fn new(tasks: Vec<Arc<dyn TaskDescriptor>>) -> Self {
        Self {
            tasks,
            started: AtomicBool::new(false),
            loops: Mutex::new(None),
        }
    }

    /// Validate and register the task set.
    ///
    /// Execution stays deferred until [`run_ready`](Self::run_ready).
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut seen = std::collections::HashSet::new();
        for task in &self.tasks {
            let name = task.name();
            if name.trim().is_empty() {
                return Err(RuntimeError::Scheduler("task with empty name".into()));
            }
            if !seen.insert(name.to_string()) {
                return Err(RuntimeError::Scheduler(format!(
                    "duplicate task name: {name}"
                )));
            }
        }
        self.started.store(true, Ordering::SeqCst);
        info!(tasks = self.tasks.len(), "scheduler started");
        Ok(())
    }

    /// Whether [`start`](Self::start) has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Execute the ready transition: run every task once (in declared
    /// order), then spawn interval loops for the recurring ones.
    ///
    /// Idempotent across reconnects: a previous epoch's loops are
    /// cancelled before the new ones spawn, so re-invocation never
    /// duplicates timers.
    pub async fn run_ready(&self, ctx: &TaskContext) {
        let epoch = CancellationToken::new();
        if let Some(previous) = self.loops.lock().replace(epoch.clone()) {
            previous.cancel();
            debug!("cancelled previous task epoch");
        }

        for task in &self.tasks {
            if let Err(err) = task.run(ctx).await {
                // Isolation: a failing task never stops its peers.
                error!(task = task.name(), error = %err, "scheduled task failed");
            }
        }

        for task in &self.tasks {
            let Some(interval) = task.interval() else {
                continue;
            };
            let task = Arc::clone(task);
            let ctx = ctx.clone();
            let token = epoch.clone();
            drop(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(interval) => {
                            if let Err(err) = task.run(&ctx).await {
                                error!(task = task.name(), error = %err, "scheduled task tick failed");
                            }
                        }
                    }
                }
                debug!(task = task.name(), "task loop exited");
            }));
        }
    }

    /// Cancel the current epoch's interval loops.
    pub fn stop(&self) {
        if let Some(token) = self.loops.lock().take() {
            token.cancel();
            debug!("scheduler stopped");
        }
    }
}
