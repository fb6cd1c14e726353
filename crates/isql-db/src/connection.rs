//! Connection-level capabilities: [`Database`], [`Transaction`], and
//! [`Statement`].
//!
//! A backend hands out `Arc<dyn Database>`. Transactions and prepared
//! statements are boxed trait objects owned by the caller.

use std::fmt;

use isql_core::DbResult;

use crate::context::Context;
use crate::cursor::{Row, Rows};
use crate::executor::{ExecResult, Executor};
use crate::value::Value;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Whatever the database uses when none is requested.
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The SQL spelling, or `None` for [`IsolationLevel::Default`].
    pub const fn as_sql(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::ReadUncommitted => Some("READ UNCOMMITTED"),
            Self::ReadCommitted => Some("READ COMMITTED"),
            Self::RepeatableRead => Some("REPEATABLE READ"),
            Self::Serializable => Some("SERIALIZABLE"),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql().unwrap_or("DEFAULT"))
    }
}

/// Options for [`Database::begin_tx`].
///
/// # Examples
///
/// ```
/// use isql_db::{IsolationLevel, TxOptions};
///
/// let opts = TxOptions::default()
///     .with_isolation(IsolationLevel::Serializable)
///     .read_only();
/// assert!(opts.read_only);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    /// Requested isolation level.
    pub isolation: IsolationLevel,
    /// Reject writes inside the transaction.
    pub read_only: bool,
}

impl TxOptions {
    /// Sets the isolation level.
    #[must_use]
    pub const fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Marks the transaction read-only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// A database handle: an [`Executor`] plus connection-level operations.
///
/// Implementations are safe to share between tasks behind an `Arc`. After
/// [`close`](Self::close) every operation fails with
/// [`DbError::ConnectionClosed`](isql_core::DbError::ConnectionClosed);
/// closing twice is harmless.
#[async_trait::async_trait]
pub trait Database: Executor {
    /// The driver name this handle was opened with (e.g. `"sqlite"`).
    fn driver_name(&self) -> &str;

    /// Starts a transaction with default options.
    async fn begin(&self) -> DbResult<Box<dyn Transaction>> {
        self.begin_tx(&Context::background(), TxOptions::default())
            .await
    }

    /// Starts a transaction.
    ///
    /// `ctx` bounds only the `BEGIN` itself.
    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> DbResult<Box<dyn Transaction>>;

    /// Verifies the database is reachable.
    async fn ping(&self) -> DbResult<()> {
        self.ping_ctx(&Context::background()).await
    }

    /// Verifies the database is reachable, honouring `ctx`.
    async fn ping_ctx(&self, ctx: &Context) -> DbResult<()>;

    /// Prepares a statement for repeated use.
    async fn prepare(&self, sql: &str) -> DbResult<Box<dyn Statement>> {
        self.prepare_ctx(&Context::background(), sql).await
    }

    /// Prepares a statement for repeated use, honouring `ctx`.
    async fn prepare_ctx(&self, ctx: &Context, sql: &str) -> DbResult<Box<dyn Statement>>;

    /// Releases the handle's resources.
    async fn close(&self) -> DbResult<()>;

    /// Views this handle as a plain [`Executor`].
    fn as_executor(&self) -> &dyn Executor;
}

/// An open transaction.
///
/// After [`commit`](Self::commit) or [`rollback`](Self::rollback) every
/// operation, including statements bound to the transaction, fails with
/// [`DbError::TxDone`](isql_core::DbError::TxDone). Dropping an unfinished
/// transaction rolls it back.
#[async_trait::async_trait]
pub trait Transaction: Executor {
    /// Commits the transaction.
    async fn commit(&self) -> DbResult<()>;

    /// Rolls the transaction back.
    async fn rollback(&self) -> DbResult<()>;

    /// Prepares a statement bound to this transaction.
    async fn prepare(&self, sql: &str) -> DbResult<Box<dyn Statement>> {
        self.prepare_ctx(&Context::background(), sql).await
    }

    /// Prepares a statement bound to this transaction, honouring `ctx`.
    async fn prepare_ctx(&self, ctx: &Context, sql: &str) -> DbResult<Box<dyn Statement>>;

    /// Binds a statement prepared elsewhere (usually on the owning
    /// [`Database`]) to this transaction.
    async fn stmt(&self, stmt: &dyn Statement) -> DbResult<Box<dyn Statement>> {
        self.stmt_ctx(&Context::background(), stmt).await
    }

    /// Binds a statement prepared elsewhere to this transaction, honouring
    /// `ctx`.
    async fn stmt_ctx(&self, ctx: &Context, stmt: &dyn Statement)
        -> DbResult<Box<dyn Statement>>;

    /// Views this transaction as a plain [`Executor`].
    fn as_executor(&self) -> &dyn Executor;
}

/// A prepared statement.
///
/// The six operations mirror [`Executor`] without the SQL text. After
/// [`close`](Self::close) they fail with
/// [`DbError::StmtClosed`](isql_core::DbError::StmtClosed).
#[async_trait::async_trait]
pub trait Statement: Send + Sync {
    /// The SQL text the statement was prepared from.
    fn sql(&self) -> &str;

    async fn exec(&self, args: &[Value]) -> DbResult<ExecResult> {
        self.exec_ctx(&Context::background(), args).await
    }

    async fn exec_ctx(&self, ctx: &Context, args: &[Value]) -> DbResult<ExecResult>;

    async fn query(&self, args: &[Value]) -> DbResult<Box<dyn Rows>> {
        self.query_ctx(&Context::background(), args).await
    }

    async fn query_ctx(&self, ctx: &Context, args: &[Value]) -> DbResult<Box<dyn Rows>>;

    async fn query_row(&self, args: &[Value]) -> Box<dyn Row> {
        self.query_row_ctx(&Context::background(), args).await
    }

    async fn query_row_ctx(&self, ctx: &Context, args: &[Value]) -> Box<dyn Row>;

    /// Releases the statement. Closing twice is harmless.
    async fn close(&self) -> DbResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_sql() {
        assert_eq!(IsolationLevel::Default.as_sql(), None);
        assert_eq!(
            IsolationLevel::RepeatableRead.as_sql(),
            Some("REPEATABLE READ")
        );
        assert_eq!(IsolationLevel::Serializable.to_string(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::Default.to_string(), "DEFAULT");
    }

    #[test]
    fn test_tx_options_builders() {
        let opts = TxOptions::default();
        assert_eq!(opts.isolation, IsolationLevel::Default);
        assert!(!opts.read_only);

        let opts = opts
            .with_isolation(IsolationLevel::ReadCommitted)
            .read_only();
        assert_eq!(opts.isolation, IsolationLevel::ReadCommitted);
        assert!(opts.read_only);
    }
}
