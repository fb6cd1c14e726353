//! # isql-db-backends
//!
//! Database drivers for isql-rs. Each driver implements the
//! [`Database`](isql_db::Database) family of traits, and [`DriverOpener`]
//! picks one by name.
//!
//! Supported drivers:
//! - `SQLite` (feature `sqlite`, on by default)
//! - `PostgreSQL` (feature `postgres`)

// significant_drop_tightening: false positives with async Mutex guards
#![allow(clippy::significant_drop_tightening)]
// cast_possible_truncation: SQLite reports affected rows as usize
#![allow(clippy::cast_possible_truncation)]

pub mod base;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{open_replica_set, Driver, DriverOpener};
