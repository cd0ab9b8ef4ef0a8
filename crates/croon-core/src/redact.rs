//! Secret redaction.
//!
//! Any string leaving the process (log line, chat reply, error text) must
//! pass through a [`SecretRedactor`] first. The redactor is built once
//! from the configured credential set and extended with the live session
//! token once the gateway identifies.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::errors::CoreError;

/// Fixed replacement for every matched secret.
pub const REDACTED_PLACEHOLDER: &str = "[redacted]";

/// Replaces every configured secret substring, case-insensitively.
///
/// Secrets are escaped before pattern construction, so credentials
/// containing regex metacharacters (`$`, `.`, `+`, ...) match literally.
/// Cheap to clone; the compiled pattern is shared.
#[derive(Clone, Debug)]
pub struct SecretRedactor {
    /// Trimmed, deduplicated secrets, longest first.
    secrets: Arc<Vec<String>>,
    /// Compiled alternation; `None` when no usable secrets were supplied.
    pattern: Option<Arc<Regex>>,
}

impl SecretRedactor {
    /// Build a redactor from the given secrets.
    ///
    /// Empty and whitespace-only entries are skipped: a degenerate
    /// pattern would match everywhere.
    pub fn new<I, S>(secrets: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cleaned: Vec<String> = secrets
            .into_iter()
            .map(|s| s.as_ref().trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        // Longest first so an overlapping shorter secret cannot shadow a
        // longer one; ties ordered for stable dedup.
        cleaned.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        cleaned.dedup();

        let pattern = if cleaned.is_empty() {
            None
        } else {
            let alternation = cleaned
                .iter()
                .map(|s| regex::escape(s))
                .collect::<Vec<_>>()
                .join("|");
            Some(Arc::new(
                RegexBuilder::new(&alternation)
                    .case_insensitive(true)
                    .build()?,
            ))
        };

        Ok(Self {
            secrets: Arc::new(cleaned),
            pattern,
        })
    }

    /// A redactor that matches nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            secrets: Arc::new(Vec::new()),
            pattern: None,
        }
    }

    /// Rebuild with an additional secret (e.g. the live session token).
    pub fn with_secret(&self, extra: &str) -> Result<Self, CoreError> {
        let mut secrets: Vec<&str> = self.secrets.iter().map(String::as_str).collect();
        secrets.push(extra);
        Self::new(secrets)
    }

    /// Replace every secret occurrence in `text` with the placeholder.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        match &self.pattern {
            Some(re) => re.replace_all(text, REDACTED_PLACEHOLDER).into_owned(),
            None => text.to_owned(),
        }
    }

    /// Number of secrets the redactor is guarding.
    #[must_use]
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }
}
