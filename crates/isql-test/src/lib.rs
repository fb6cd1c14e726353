//! # isql-test
//!
//! Testing utilities for isql-rs. Provides a recording fake database and
//! opener for verifying where a [`ReplicaSet`](isql_db::ReplicaSet) sends
//! each call, a scripted replica picker, an in-memory SQLite database with a
//! query counter, and assertion helpers built on them.
//!
//! ## Modules
//!
//! - [`fake`] - [`FakeDatabase`], a `Database` that logs every call
//! - [`opener`] - [`FakeOpener`], which hands out fakes and can fail on demand
//! - [`picker`] - [`ScriptedPicker`], a replica picker with a fixed script
//! - [`test_database`] - [`TestDatabase`], an in-memory SQLite handle
//! - [`assertions`] - routing and query-count assertions

// `SQLite` and `ReplicaSet` read better unquoted in prose.
#![allow(clippy::doc_markdown)]

pub mod assertions;
pub mod fake;
pub mod opener;
pub mod picker;
#[cfg(feature = "sqlite")]
pub mod test_database;

pub use assertions::{assert_hit_distribution, assert_routed_only_to, hit_counts};
#[cfg(feature = "sqlite")]
pub use assertions::{assert_max_queries, assert_num_queries};
pub use fake::{Call, FakeDatabase, FakeStatement, FakeTransaction, Method};
pub use opener::FakeOpener;
pub use picker::ScriptedPicker;
#[cfg(feature = "sqlite")]
pub use test_database::TestDatabase;
