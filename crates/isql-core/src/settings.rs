//! Settings for isql-rs.
//!
//! [`Settings`] holds the logging configuration and the [`DatabaseSettings`]
//! describing one primary connection and its read replicas. Every field has a
//! default so partial configuration files can be merged over
//! [`Settings::default`] by the [`settings_loader`](crate::settings_loader).

use serde::{Deserialize, Serialize};

/// Connection configuration for a primary and its read replicas.
///
/// The driver identifier and connection strings are passed to the opener
/// unmodified; nothing here is validated beyond deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The driver identifier (e.g. `sqlite`, `postgres`).
    pub driver: String,
    /// Connection string of the write-capable primary.
    pub primary: String,
    /// Connection strings of the read-only replicas, in routing order.
    pub replicas: Vec<String>,
    /// Seed for reproducible replica selection. `None` uses a thread-local
    /// generator.
    pub replica_seed: Option<u64>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            primary: ":memory:".to_string(),
            replicas: Vec::new(),
            replica_seed: None,
        }
    }
}

/// Top-level settings.
///
/// # Examples
///
/// ```
/// use isql_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(!settings.debug);
/// assert_eq!(settings.database.driver, "sqlite");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,

    /// The log level or `EnvFilter` directive (e.g. "info", "isql_db=debug").
    pub log_level: String,

    /// The primary/replica connection configuration.
    pub database: DatabaseSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
        }
    }
}

impl Settings {
    /// Returns the settings with the given database configuration.
    #[must_use]
    pub fn with_database(mut self, database: DatabaseSettings) -> Self {
        self.database = database;
        self
    }
}
