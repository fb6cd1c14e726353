//! Core error types for isql-rs.
//!
//! [`DbError`] is the single error type returned by every capability trait,
//! driver backend, and the replica router. It is `Clone` and `PartialEq` so a
//! value produced by one connection can be compared against what a caller
//! received after it passed through a router or wrapper.

use thiserror::Error;

/// The primary error type for isql-rs.
///
/// Variants are grouped by origin: connection establishment, statement
/// execution, handle lifecycle, cancellation, and configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    // ── Opening ──────────────────────────────────────────────────────

    /// No driver is registered under the given identifier.
    #[error("Unknown driver: {0:?} (is the matching feature enabled?)")]
    UnknownDriver(String),

    /// An operational error (connection failure, pool exhaustion, bad DSN).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Execution ────────────────────────────────────────────────────

    /// A statement failed inside the database.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// A single-row query matched nothing.
    #[error("No rows in result set")]
    NoRows,

    /// A cursor was read before `advance` positioned it on a row.
    #[error("No current row: call advance() before scan()")]
    NoCurrentRow,

    /// A value could not be converted to the requested Rust type.
    #[error("Conversion error: {0}")]
    ConversionError(String),

    /// The driver does not support the requested operation or option.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    // ── Lifecycle ────────────────────────────────────────────────────

    /// The transaction has already been committed or rolled back.
    #[error("Transaction has already been committed or rolled back")]
    TxDone,

    /// The prepared statement has been closed.
    #[error("Statement is closed")]
    StmtClosed,

    /// The cursor has been closed.
    #[error("Rows are closed")]
    RowsClosed,

    /// The connection has been closed.
    #[error("Database is closed")]
    ConnectionClosed,

    // ── Cancellation ─────────────────────────────────────────────────

    /// The call's context was cancelled.
    #[error("Context cancelled")]
    Cancelled,

    /// The call's context deadline passed.
    #[error("Context deadline exceeded")]
    DeadlineExceeded,

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl DbError {
    /// Returns `true` if this error was caused by context cancellation or
    /// deadline expiry rather than by the database.
    pub const fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns `true` if this error reports use of a handle after it was
    /// closed or finished.
    pub const fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::TxDone | Self::StmtClosed | Self::RowsClosed | Self::ConnectionClosed
        )
    }
}

/// A convenience type alias for `Result<T, DbError>`.
pub type DbResult<T> = Result<T, DbError>;
