//! # isql
//!
//! Capability traits over SQL database handles, with primary/replica read
//! routing.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `isql` to get everything, or on individual crates for
//! finer-grained control.
//!
//! ```rust,no_run
//! use isql::prelude::*;
//!
//! async fn example() -> DbResult<()> {
//!     let settings = isql::core::settings_loader::from_toml_file_with_env("isql.toml")?;
//!     isql::core::logging::setup_logging(&settings);
//!
//!     let set = isql::open_replica_set(&settings.database).await?;
//!     set.exec("INSERT INTO events (kind) VALUES (?)", &[Value::from("login")])
//!         .await?;
//!     let row = set.query_row("SELECT COUNT(*) AS n FROM events", &[]).await;
//!     let n: i64 = row.scan()?.get("n")?;
//!     tracing::info!(n, "Counted events");
//!     set.close().await
//! }
//! ```

/// Error types, settings, and logging setup.
pub use isql_core as core;

/// Capability traits, values, cursors, and the replica router.
pub use isql_db as db;

/// Driver backends: `SQLite` and `PostgreSQL`.
pub use isql_db_backends as db_backends;

/// Recording fakes and assertions for tests.
#[cfg(feature = "testing")]
pub use isql_test as test;

pub use isql_db_backends::{open_replica_set, Driver, DriverOpener};

// Third-party re-exports.
pub use async_trait;
pub use tokio;
pub use tracing;
pub use tracing_subscriber;

/// The types most programs need.
pub mod prelude {
    pub use isql_core::{DatabaseSettings, DbError, DbResult, Settings};
    pub use isql_db::{
        collect_records, Context, Database, ExecResult, Executor, FromValue, IsolationLevel,
        Opener, Record, ReplicaPicker, ReplicaSet, Row, Rows, Statement, Transaction, TxOptions,
        Value,
    };
    pub use isql_db_backends::DriverOpener;
}
