//! # isql-core
//!
//! Foundation types shared by every isql-rs crate. This crate has no database
//! dependencies of its own.
//!
//! ## Modules
//!
//! - [`error`] - The [`DbError`] enum and the [`DbResult`] alias
//! - [`settings`] - Database and logging configuration
//! - [`settings_loader`] - Loading [`Settings`] from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{DbError, DbResult};
pub use settings::{DatabaseSettings, Settings};
