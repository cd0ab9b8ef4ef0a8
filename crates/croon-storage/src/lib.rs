//! # croon-storage
//!
//! Persistence layer for the croon bot: a pooled SQLite session with an
//! explicit connect/destroy lifecycle and the query surface plugins and
//! scheduled tasks consume (guild settings, key-value scratch state,
//! playback stats).
//!
//! The manager serializes nothing itself — the pool hands out
//! connections and SQLite serializes concurrent statements. Lifecycle
//! rules:
//!
//! - [`StorageManager::connect`] is idempotent (connected ⇒ no-op)
//! - [`StorageManager::destroy`] is safe when never connected
//! - every query on a disconnected manager returns
//!   [`errors::StorageError::NotConnected`], never panics

#![deny(unsafe_code)]

pub mod errors;
pub mod manager;
pub mod migrations;

pub use errors::StorageError;
pub use manager::{GuildSettings, StorageManager};
