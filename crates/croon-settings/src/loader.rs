//! Settings loading: defaults ← file ← environment.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::SettingsError;
use crate::types::CroonSettings;

/// Deep-merge `overlay` into `base`.
///
/// Objects merge key-by-key; any other value in the overlay replaces the
/// base wholesale (arrays included — partial array merges are ambiguous).
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Environment overrides, highest priority layer.
///
/// Supported variables:
/// - `CROON_TOKEN` → `gateway.token`
/// - `CROON_GATEWAY_URL` → `gateway.url`
/// - `CROON_SHARDS` → `gateway.shardCount`
/// - `CROON_PREFIX` → `bot.prefix`
/// - `CROON_LOCALE` → `bot.locale`
/// - `CROON_DB_PATH` → `storage.path`
/// - `CROON_LOG` → `log.filter`
///
/// Takes the variables as an iterator so tests do not mutate the process
/// environment.
pub fn apply_env_overrides<I>(mut value: Value, vars: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, var_value) in vars {
        let path: &[&str] = match key.as_str() {
            "CROON_TOKEN" => &["gateway", "token"],
            "CROON_GATEWAY_URL" => &["gateway", "url"],
            "CROON_SHARDS" => &["gateway", "shardCount"],
            "CROON_PREFIX" => &["bot", "prefix"],
            "CROON_LOCALE" => &["bot", "locale"],
            "CROON_DB_PATH" => &["storage", "path"],
            "CROON_LOG" => &["log", "filter"],
            _ => continue,
        };
        let parsed = match key.as_str() {
            // Numeric override; ignore garbage rather than failing startup.
            "CROON_SHARDS" => match var_value.parse::<u32>() {
                Ok(n) => Value::from(n),
                Err(_) => {
                    debug!(%key, value = %var_value, "ignoring non-numeric env override");
                    continue;
                }
            },
            _ => Value::from(var_value),
        };
        set_path(&mut value, path, parsed);
    }
    value
}

fn set_path(value: &mut Value, path: &[&str], new_value: Value) {
    let mut cursor = value;
    for segment in &path[..path.len() - 1] {
        if !cursor.is_object() {
            *cursor = Value::Object(serde_json::Map::new());
        }
        cursor = cursor
            .as_object_mut()
            .expect("just ensured object")
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(serde_json::Map::new());
    }
    let _ = cursor
        .as_object_mut()
        .expect("just ensured object")
        .insert(path[path.len() - 1].to_string(), new_value);
}

impl CroonSettings {
    /// Load settings: compiled defaults, deep-merged config file (when
    /// present), then `CROON_*` environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self, SettingsError> {
        let defaults = serde_json::to_value(Self::default())?;

        let merged = match config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let file_value: Value = serde_json::from_str(&raw)?;
                debug!(path = %path.display(), "loaded config file");
                deep_merge(defaults, file_value)
            }
            None => defaults,
        };

        let with_env = apply_env_overrides(merged, std::env::vars());
        Ok(serde_json::from_value(with_env)?)
    }
}
