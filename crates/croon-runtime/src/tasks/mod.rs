//! Scheduled background work.
//!
//! Tasks are registered at startup and executed only once the session is
//! ready (they typically need a live identity: presence refresh, stats
//! snapshots). One task's failure is caught and logged — it never stops
//! its peers or its own next tick.

pub mod builtin;
pub mod scheduler;
pub mod types;

pub use builtin::{PresenceTask, StatsTask};
pub use scheduler::Scheduler;
pub use types::{TaskContext, TaskDescriptor, TaskError};
