//! Settings types and compiled defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Root configuration for the bot process.
///
/// Every field carries a compiled default so a partial config file (or
/// none at all, for offline runs) deserializes cleanly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CroonSettings {
    /// Remote gateway connection.
    pub gateway: GatewaySettings,
    /// Third-party service credentials, keyed by service name.
    pub services: BTreeMap<String, String>,
    /// Audio cluster nodes.
    pub cluster: Vec<NodeSettings>,
    /// Persistence.
    pub storage: StorageSettings,
    /// Bot behavior.
    pub bot: BotSettings,
    /// Logging.
    pub log: LogSettings,
}

/// Gateway connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewaySettings {
    /// Gateway websocket URL.
    pub url: String,
    /// Authentication token for the remote platform.
    pub token: String,
    /// Shards to request from the platform.
    pub shard_count: u32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7000/".to_string(),
            token: String::new(),
            shard_count: 1,
        }
    }
}

/// One audio-processing node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeSettings {
    /// Node host.
    pub host: String,
    /// Node port.
    pub port: u16,
    /// Node password.
    pub password: String,
    /// Shard count the node expects from this session.
    pub shard_count: u32,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2333,
            password: String::new(),
            shard_count: 1,
        }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageSettings {
    /// SQLite database path; `:memory:` is accepted for tests.
    pub path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: "croon.db".to_string(),
        }
    }
}

/// Bot behavior settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BotSettings {
    /// Default command prefix (per-guild override lives in storage).
    pub prefix: String,
    /// Locale key for the translation catalog.
    pub locale: String,
    /// Cool-down between destroy and bootstrap during an emergency reboot.
    pub reboot_cooldown_ms: u64,
    /// Interval for the periodic presence refresh task.
    pub presence_interval_secs: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            locale: "en".to_string(),
            reboot_cooldown_ms: 60_000,
            presence_interval_secs: 300,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive string.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl CroonSettings {
    /// Check that the settings can actually start a session.
    ///
    /// Only credential presence is validated here; connectivity problems
    /// surface later as connection errors with their own recovery path.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.gateway.token.trim().is_empty() {
            return Err(SettingsError::MissingCredential("gateway.token"));
        }
        for node in &self.cluster {
            if node.host.trim().is_empty() {
                return Err(SettingsError::InvalidNode(format!(
                    "node on port {} has an empty host",
                    node.port
                )));
            }
        }
        Ok(())
    }

    /// The full credential set for redaction.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        let mut secrets = vec![self.gateway.token.clone()];
        secrets.extend(self.services.values().cloned());
        secrets.extend(self.cluster.iter().map(|n| n.password.clone()));
        Credentials { secrets }
    }
}

/// Process-wide secrets, read-only after startup.
///
/// This is the single source the redactor is built from: gateway token,
/// every third-party service password, every node password.
#[derive(Clone, Debug)]
pub struct Credentials {
    secrets: Vec<String>,
}

impl Credentials {
    /// All secret strings (empty entries are filtered by the redactor).
    #[must_use]
    pub fn secrets(&self) -> Vec<&str> {
        self.secrets.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = CroonSettings::default();
        assert_eq!(s.bot.prefix, "!");
        assert_eq!(s.bot.reboot_cooldown_ms, 60_000);
        assert_eq!(s.gateway.shard_count, 1);
        assert!(s.cluster.is_empty());
    }

    #[test]
    fn validate_rejects_empty_token() {
        let s = CroonSettings::default();
        assert!(matches!(
            s.validate(),
            Err(SettingsError::MissingCredential("gateway.token"))
        ));
    }

    #[test]
    fn validate_accepts_token() {
        let mut s = CroonSettings::default();
        s.gateway.token = "tok-123".into();
        s.validate().unwrap();
    }

    #[test]
    fn validate_rejects_empty_node_host() {
        let mut s = CroonSettings::default();
        s.gateway.token = "tok".into();
        s.cluster.push(NodeSettings {
            host: " ".into(),
            ..NodeSettings::default()
        });
        assert!(matches!(s.validate(), Err(SettingsError::InvalidNode(_))));
    }

    #[test]
    fn credentials_collects_all_secrets() {
        let mut s = CroonSettings::default();
        s.gateway.token = "gw-token".into();
        let _ = s.services.insert("lyrics".into(), "lyr-key".into());
        s.cluster.push(NodeSettings {
            password: "node-pass".into(),
            ..NodeSettings::default()
        });
        let creds = s.credentials();
        let secrets = creds.secrets();
        assert!(secrets.contains(&"gw-token"));
        assert!(secrets.contains(&"lyr-key"));
        assert!(secrets.contains(&"node-pass"));
    }

    #[test]
    fn partial_json_deserializes_with_defaults() {
        let s: CroonSettings =
            serde_json::from_str(r#"{"bot": {"prefix": "?"}}"#).unwrap();
        assert_eq!(s.bot.prefix, "?");
        assert_eq!(s.bot.locale, "en");
        assert_eq!(s.storage.path, "croon.db");
    }
}
