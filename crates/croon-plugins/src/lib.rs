//! # croon-plugins
//!
//! Command/event handler loading and dispatch.
//!
//! A [`types::Plugin`] is an independently authored handler unit: it
//! names the commands it serves and may react to gateway events. The
//! [`registry::PluginRegistry`] indexes plugins at `start()` and
//! dispatches by command name or event, with two hard rules:
//!
//! - an unknown command/event is a **no-op**, not an error
//! - a failing handler is caught at the dispatch boundary, logged once,
//!   and converted into a generic redacted reply — it never crashes the
//!   registry or the process, and never affects a later dispatch
//!
//! Handlers receive a [`types::PluginContext`]: the narrow capability
//! set (storage, catalog, redactor, packet sender) rather than the whole
//! orchestrator.

#![deny(unsafe_code)]

pub mod builtin;
pub mod errors;
pub mod registry;
pub mod types;

pub use errors::PluginError;
pub use registry::PluginRegistry;
pub use types::{CommandInvocation, Plugin, PluginContext, Reply};
