//! # croon-core
//!
//! Foundation types for the croon bot runtime.
//!
//! This crate provides the shared vocabulary that all other croon crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::GuildId`], [`ids::UserId`], [`ids::ShardId`]
//!   and friends as newtypes
//! - **Gateway events**: [`events::GatewayEvent`] — the inbound session
//!   event stream consumed by the dispatcher
//! - **Connection state**: [`state::ConnectionState`] with an explicit
//!   transition table
//! - **Redaction**: [`redact::SecretRedactor`] — keeps credentials out of
//!   every external sink
//! - **Capabilities**: [`capability::PacketSender`] — the narrow
//!   interfaces components receive instead of the whole orchestrator
//! - **Errors**: [`errors::CoreError`] via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other croon crates.

#![deny(unsafe_code)]

pub mod capability;
pub mod errors;
pub mod events;
pub mod ids;
pub mod redact;
pub mod state;

pub use capability::PacketSender;
pub use errors::CoreError;
pub use events::{GatewayEvent, Message};
pub use ids::{ChannelId, GuildId, NodeId, ShardId, UserId};
pub use redact::{REDACTED_PLACEHOLDER, SecretRedactor};
pub use state::ConnectionState;
