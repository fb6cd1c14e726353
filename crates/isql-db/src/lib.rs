//! # isql-db
//!
//! Capability traits for SQL database handles, and a [`ReplicaSet`] that
//! routes writes to a primary and reads to randomly chosen replicas.
//!
//! ## Architecture
//!
//! Code that runs SQL depends on the smallest trait it needs rather than on
//! a concrete driver type. [`Executor`] is the narrowest: `exec`, `query`, and
//! `query_row`. [`Database`], [`Transaction`], and [`Statement`] add the
//! connection-, transaction-, and statement-level operations. Drivers live in
//! `isql-db-backends`; fakes for tests live in `isql-test`.
//!
//! Because [`ReplicaSet`] implements [`Executor`], a function written against
//! `&dyn Executor` works unchanged with a single connection, a transaction,
//! or a replica set.
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`] enum and [`FromValue`]
//! - [`record`] - Materialized rows
//! - [`column`] - Column metadata
//! - [`cursor`] - The [`Rows`] and [`Row`] result accessors
//! - [`context`] - Cancellation and deadlines
//! - [`executor`] - The [`Executor`] trait and [`ExecResult`]
//! - [`connection`] - [`Database`], [`Transaction`], and [`Statement`]
//! - [`opener`] - The [`Opener`] trait
//! - [`picker`] - Replica selection strategies
//! - [`replica`] - The [`ReplicaSet`] router

// doc_markdown: driver names such as PostgreSQL and SQLite read better unquoted
#![allow(clippy::doc_markdown)]
// significant_drop_tightening: false positives with Mutex guards in pickers
#![allow(clippy::significant_drop_tightening)]

pub mod column;
pub mod connection;
pub mod context;
pub mod cursor;
pub mod executor;
pub mod opener;
pub mod picker;
pub mod record;
pub mod replica;
pub mod value;

pub use column::{ColumnInfo, ColumnType};
pub use connection::{Database, IsolationLevel, Statement, Transaction, TxOptions};
pub use context::Context;
pub use cursor::{collect_records, BufferedRows, ResultSet, Row, RowResult, Rows};
pub use executor::{ExecResult, Executor};
pub use opener::Opener;
pub use picker::{ReplicaPicker, SeededPicker, ThreadRngPicker};
pub use record::Record;
pub use replica::ReplicaSet;
pub use value::{FromValue, Value, ValueKind};
