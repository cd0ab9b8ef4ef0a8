//! # croon-runtime
//!
//! The orchestration core: [`client::Client`] owns process lifecycle
//! (bootstrap, ready transitions, graceful destroy, emergency reboot),
//! composes the independently developed subsystems (plugin registry,
//! scheduler, storage, audio cluster bridge) into one runtime, and
//! mediates the shared state they touch concurrently.
//!
//! - **Client**: lifecycle state machine + packet-send bridge
//! - **Dispatcher**: forwards gateway events to plugins and the audio
//!   bridge; command dispatches run as independent tasks so a slow
//!   handler never blocks the event loop
//! - **Tasks**: [`tasks::TaskDescriptor`] execution deferred until the
//!   session is ready, with per-task failure isolation
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: croon-core, croon-settings,
//! croon-gateway, croon-storage, croon-plugins, croon-audio.
//! Depended on by: the `croon` binary.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod tasks;

pub use client::Client;
pub use errors::RuntimeError;
pub use tasks::{Scheduler, TaskContext, TaskDescriptor, TaskError};
