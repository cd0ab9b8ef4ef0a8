//! Translation catalog.
//!
//! Loaded once at process start, read-only afterwards (init-only
//! lifecycle, no teardown, no locking). A lookup miss is not an error:
//! the key itself is returned so a missing translation degrades to a
//! readable-ish string instead of a failure.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::SettingsError;

/// The embedded default locale, compiled into the binary.
const EMBEDDED_EN: &str = include_str!("../locales/en.json");

/// Read-only key → phrase lookup used by response formatting.
#[derive(Clone, Debug)]
pub struct TranslationCatalog {
    entries: HashMap<String, String>,
    locale: String,
}

impl TranslationCatalog {
    /// The embedded English catalog.
    #[must_use]
    pub fn builtin() -> Self {
        let entries: HashMap<String, String> =
            serde_json::from_str(EMBEDDED_EN).expect("embedded locale is valid JSON");
        Self {
            entries,
            locale: "en".to_string(),
        }
    }

    /// Load the catalog for `locale`.
    ///
    /// Starts from the embedded English entries and overlays
    /// `<locale_dir>/<locale>.json` when it exists, so partial
    /// translations fall back per-key rather than per-file.
    pub fn load(locale_dir: Option<&Path>, locale: &str) -> Result<Self, SettingsError> {
        let mut catalog = Self::builtin();
        catalog.locale = locale.to_string();

        let Some(dir) = locale_dir else {
            return Ok(catalog);
        };
        let path = dir.join(format!("{locale}.json"));
        if !path.exists() {
            if locale != "en" {
                warn!(%locale, path = %path.display(), "locale file not found, using embedded defaults");
            }
            return Ok(catalog);
        }

        let raw = std::fs::read_to_string(&path)?;
        let overlay: HashMap<String, String> = serde_json::from_str(&raw)?;
        debug!(%locale, keys = overlay.len(), "loaded locale overlay");
        catalog.entries.extend(overlay);
        Ok(catalog)
    }

    /// Look up a phrase; a miss returns the key itself.
    #[must_use]
    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.get(key).map_or(key, String::as_str)
    }

    /// Look up a phrase and substitute `{}` placeholders left to right.
    ///
    /// Surplus arguments are dropped; surplus placeholders stay verbatim.
    #[must_use]
    pub fn format(&self, key: &str, args: &[&str]) -> String {
        let mut out = self.get(key).to_string();
        for arg in args {
            match out.find("{}") {
                Some(idx) => out.replace_range(idx..idx + 2, arg),
                None => break,
            }
        }
        out
    }

    /// The locale this catalog was loaded for.
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }
}

impl Default for TranslationCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_core_keys() {
        let c = TranslationCatalog::builtin();
        assert_eq!(c.get("cmd.ping.reply"), "Pong!");
        assert_eq!(c.locale(), "en");
    }

    #[test]
    fn miss_returns_key() {
        let c = TranslationCatalog::builtin();
        assert_eq!(c.get("no.such.key"), "no.such.key");
    }

    #[test]
    fn format_substitutes_placeholders() {
        let c = TranslationCatalog::builtin();
        assert_eq!(c.format("cmd.uptime.reply", &["42"]), "Online for 42 minutes.");
    }

    #[test]
    fn format_with_surplus_args() {
        let c = TranslationCatalog::builtin();
        assert_eq!(c.format("cmd.ping.reply", &["ignored"]), "Pong!");
    }

    #[test]
    fn overlay_merges_per_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("de.json"),
            r#"{"cmd.ping.reply": "Pong, aber auf Deutsch!"}"#,
        )
        .unwrap();
        let c = TranslationCatalog::load(Some(dir.path()), "de").unwrap();
        assert_eq!(c.get("cmd.ping.reply"), "Pong, aber auf Deutsch!");
        // Untranslated keys fall back to the embedded English phrase.
        assert_eq!(c.get("error.generic"), "Something went wrong while running that command.");
    }

    #[test]
    fn missing_locale_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let c = TranslationCatalog::load(Some(dir.path()), "fr").unwrap();
        assert_eq!(c.get("cmd.ping.reply"), "Pong!");
        assert_eq!(c.locale(), "fr");
    }

    #[test]
    fn invalid_locale_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.json"), "nope").unwrap();
        assert!(matches!(
            TranslationCatalog::load(Some(dir.path()), "en"),
            Err(SettingsError::Parse(_))
        ));
    }
}
