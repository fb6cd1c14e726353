//! Driver selection.
//!
//! [`DriverOpener`] is the [`Opener`] that maps driver names to the drivers
//! compiled into this crate. [`open_replica_set`] builds a [`ReplicaSet`]
//! straight from [`DatabaseSettings`].

use std::sync::Arc;

use isql_core::{DatabaseSettings, DbError, DbResult};
use isql_db::{Database, Opener, ReplicaPicker, ReplicaSet, SeededPicker, ThreadRngPicker};
use tracing::debug;

/// The drivers this build knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// `sqlite` or `sqlite3`.
    Sqlite,
    /// `postgres` or `postgresql`.
    Postgres,
}

impl Driver {
    /// Parses a driver name. Names are case-insensitive.
    pub fn from_name(name: &str) -> DbResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(DbError::UnknownDriver(name.to_string())),
        }
    }

    /// Whether support for this driver was compiled in.
    pub const fn is_enabled(self) -> bool {
        match self {
            Self::Sqlite => cfg!(feature = "sqlite"),
            Self::Postgres => cfg!(feature = "postgres"),
        }
    }
}

/// Opens handles for every driver enabled in this build.
///
/// | Driver names            | Feature    | Connection string                      |
/// |-------------------------|------------|----------------------------------------|
/// | `sqlite`, `sqlite3`     | `sqlite`   | `:memory:`, a path, or `sqlite://...`  |
/// | `postgres`, `postgresql`| `postgres` | URL or `key=value` form                |
///
/// Any other name, or a known name whose feature is disabled, fails with
/// [`DbError::UnknownDriver`].
///
/// # Examples
///
/// ```
/// use isql_db::{Database, Opener};
/// use isql_db_backends::DriverOpener;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let db = DriverOpener.open("sqlite", ":memory:").await.unwrap();
/// assert_eq!(db.driver_name(), "sqlite");
/// assert!(DriverOpener.open("oracle", "scott/tiger").await.is_err());
/// # });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverOpener;

#[async_trait::async_trait]
impl Opener for DriverOpener {
    async fn open(&self, driver: &str, dsn: &str) -> DbResult<Arc<dyn Database>> {
        let kind = Driver::from_name(driver)?;
        debug!(driver, enabled = kind.is_enabled(), "Opening connection");
        match kind {
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => {
                let dsn = dsn.to_string();
                let db = tokio::task::spawn_blocking(move || {
                    crate::sqlite::SqliteDatabase::open(&dsn)
                })
                .await
                .map_err(|e| DbError::OperationalError(format!("Task join error: {e}")))??;
                Ok(Arc::new(db))
            }
            #[cfg(feature = "postgres")]
            Driver::Postgres => Ok(Arc::new(crate::postgresql::PostgresDatabase::open(dsn)?)),
            #[allow(unreachable_patterns)]
            _ => Err(DbError::UnknownDriver(driver.to_string())),
        }
    }
}

/// Opens a [`ReplicaSet`] described by `settings` using [`DriverOpener`].
///
/// A configured `replica_seed` selects a [`SeededPicker`]; otherwise
/// replicas are picked with a [`ThreadRngPicker`].
pub async fn open_replica_set(settings: &DatabaseSettings) -> DbResult<ReplicaSet> {
    let picker: Box<dyn ReplicaPicker> = match settings.replica_seed {
        Some(seed) => Box::new(SeededPicker::new(seed)),
        None => Box::new(ThreadRngPicker),
    };
    ReplicaSet::open_with_picker(
        &DriverOpener,
        picker,
        &settings.driver,
        &settings.primary,
        &settings.replicas,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_names() {
        assert_eq!(Driver::from_name("sqlite3").unwrap(), Driver::Sqlite);
        assert_eq!(Driver::from_name("PostgreSQL").unwrap(), Driver::Postgres);
        assert_eq!(
            Driver::from_name("mysql").unwrap_err(),
            DbError::UnknownDriver("mysql".into())
        );
    }

    #[tokio::test]
    async fn test_unknown_driver() {
        let err = DriverOpener.open("oracle", "x").await.err().unwrap();
        assert_eq!(err, DbError::UnknownDriver("oracle".into()));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_sqlite_memory() {
        let db = DriverOpener.open("sqlite", ":memory:").await.unwrap();
        assert_eq!(db.driver_name(), "sqlite");
        db.ping().await.unwrap();
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_replica_set_from_settings() {
        let settings = DatabaseSettings {
            replicas: vec![":memory:".into(), ":memory:".into()],
            replica_seed: Some(3),
            ..DatabaseSettings::default()
        };
        let set = open_replica_set(&settings).await.unwrap();
        assert_eq!(set.replica_count(), 2);
        assert_eq!(set.driver_name(), "sqlite");
        set.close().await.unwrap();
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_disabled_driver_is_unknown() {
        let err = DriverOpener.open("postgres", "host=x").await.err().unwrap();
        assert_eq!(err, DbError::UnknownDriver("postgres".into()));
    }
}
