//! Settings loading from configuration files.
//!
//! This module provides functions to load [`Settings`] from TOML files, JSON
//! files, and to apply environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `ISQL_DEBUG` | `debug` |
//! | `ISQL_LOG_LEVEL` | `log_level` |
//! | `ISQL_DB_DRIVER` | `database.driver` |
//! | `ISQL_DB_PRIMARY` | `database.primary` |
//! | `ISQL_DB_REPLICAS` | `database.replicas` (comma-separated) |
//! | `ISQL_DB_REPLICA_SEED` | `database.replica_seed` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use isql_core::settings_loader;
//!
//! // Load from TOML
//! let settings = settings_loader::from_toml_file("config/isql.toml").unwrap();
//!
//! // Load from TOML with environment overrides
//! let settings = settings_loader::from_toml_file_with_env("config/isql.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::DbError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, DbError> {
    // Deserialize into a generic value first so a partial document can be
    // merged over the defaults instead of requiring every field.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| DbError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, DbError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        DbError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, DbError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, DbError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| DbError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, DbError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        DbError::ConfigurationError(format!(
            "Failed to read JSON file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_json_str(&content)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies environment variable overrides to a settings struct.
///
/// See the module documentation for the supported variables.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Applies overrides read through `lookup`, keyed by environment variable name.
///
/// `ISQL_DEBUG` accepts "true"/"1"/"yes" (anything else is false). An
/// unparsable `ISQL_DB_REPLICA_SEED` is ignored with a warning. An empty
/// `ISQL_DB_REPLICAS` clears the replica list.
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("ISQL_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = lookup("ISQL_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = lookup("ISQL_DB_DRIVER") {
        settings.database.driver = val;
    }

    if let Some(val) = lookup("ISQL_DB_PRIMARY") {
        settings.database.primary = val;
    }

    if let Some(val) = lookup("ISQL_DB_REPLICAS") {
        settings.database.replicas = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(val) = lookup("ISQL_DB_REPLICA_SEED") {
        match val.trim().parse::<u64>() {
            Ok(seed) => settings.database.replica_seed = Some(seed),
            Err(e) => tracing::warn!(value = %val, error = %e, "ignoring invalid ISQL_DB_REPLICA_SEED"),
        }
    }
}

// ============================================================
// Helpers
// ============================================================

/// Deep-merges `overrides` over the serialized default settings and
/// deserializes the result.
fn merge_over_defaults(overrides: serde_json::Value, format: &str) -> Result<Settings, DbError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        DbError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, overrides);
    serde_json::from_value(merged).map_err(|e| {
        DbError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
