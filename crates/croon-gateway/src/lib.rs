//! # croon-gateway
//!
//! The remote platform boundary: an authenticated, sharded event-stream
//! session consumed as opaque connect/send/event surfaces.
//!
//! - [`traits::Gateway`] / [`traits::GatewayHandle`] — the seam the
//!   orchestrator programs against
//! - [`shard::ShardMap`] — guild → shard routing with an explicit
//!   "not found → caller no-ops" contract
//! - [`ws::WsGateway`] — websocket transport speaking a small JSON
//!   envelope; reconnects itself with jittered backoff unless the session
//!   was explicitly disconnected
//! - [`memory::InMemoryGateway`] — deterministic in-process double for
//!   tests and offline runs
//!
//! ## Crate Position
//!
//! Depends on croon-core only. Depended on by croon-runtime and the
//! binary.

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors;
pub mod memory;
pub mod shard;
pub mod traits;
pub mod ws;

pub use errors::GatewayError;
pub use memory::{InMemoryGateway, InMemoryHandle};
pub use shard::ShardMap;
pub use traits::{Gateway, GatewayHandle, SessionInfo};
pub use ws::WsGateway;
