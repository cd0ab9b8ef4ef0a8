//! # croon-settings
//!
//! Configuration management with layered sources for the croon bot.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`CroonSettings::default()`]
//! 2. **Config file** — JSON, deep-merged over defaults
//! 3. **Environment variables** — `CROON_*` overrides (highest priority)
//!
//! There is no global singleton: [`CroonSettings::load`] returns an owned
//! value that the process entry point hands to the client constructor,
//! and each component receives only the slice it needs.
//!
//! The crate also owns the [`locale::TranslationCatalog`]: loaded once at
//! startup, read-only afterwards.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod locale;
pub mod types;

pub use errors::SettingsError;
pub use loader::{apply_env_overrides, deep_merge};
pub use locale::TranslationCatalog;
pub use types::{
    BotSettings, Credentials, CroonSettings, GatewaySettings, LogSettings, NodeSettings,
    StorageSettings,
};
