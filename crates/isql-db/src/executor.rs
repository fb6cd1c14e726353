//! The [`Executor`] capability: the operations every query-capable handle
//! offers, and the contract [`ReplicaSet`](crate::ReplicaSet) routes.

use isql_core::{DbError, DbResult};

use crate::context::Context;
use crate::cursor::{Row, Rows};
use crate::value::Value;

/// The outcome of a statement that does not return rows.
///
/// # Examples
///
/// ```
/// use isql_db::ExecResult;
///
/// let result = ExecResult::new(3).with_last_insert_id(42);
/// assert_eq!(result.rows_affected(), 3);
/// assert_eq!(result.last_insert_id().unwrap(), 42);
///
/// assert!(ExecResult::new(1).last_insert_id().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    rows_affected: u64,
    last_insert_id: Option<i64>,
}

impl ExecResult {
    /// A result with only the affected row count known.
    pub const fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            last_insert_id: None,
        }
    }

    /// Attaches the id generated by the statement.
    #[must_use]
    pub const fn with_last_insert_id(mut self, id: i64) -> Self {
        self.last_insert_id = Some(id);
        self
    }

    /// Number of rows inserted, updated, or deleted.
    pub const fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// The id generated by the statement.
    ///
    /// Fails with [`DbError::Unsupported`] when the driver does not report
    /// generated ids (PostgreSQL users should use `RETURNING` instead).
    pub fn last_insert_id(&self) -> DbResult<i64> {
        self.last_insert_id.ok_or_else(|| {
            DbError::Unsupported("last_insert_id is not reported by this driver".to_string())
        })
    }
}

/// Runs statements and queries.
///
/// Connections, transactions, and replica sets all implement this trait, so
/// code written against `&dyn Executor` works with any of them.
///
/// Each operation comes in two forms: a plain form and a `_ctx` form that
/// takes a [`Context`] for cancellation and deadlines. The plain forms
/// default to [`Context::background()`]; implementors only have to provide
/// the `_ctx` forms.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Executes a statement that does not return rows.
    async fn exec(&self, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.exec_ctx(&Context::background(), sql, args).await
    }

    /// Executes a statement that does not return rows, honouring `ctx`.
    async fn exec_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult>;

    /// Runs a query and returns a cursor over its rows.
    async fn query(&self, sql: &str, args: &[Value]) -> DbResult<Box<dyn Rows>> {
        self.query_ctx(&Context::background(), sql, args).await
    }

    /// Runs a query and returns a cursor over its rows, honouring `ctx`.
    async fn query_ctx(&self, ctx: &Context, sql: &str, args: &[Value])
        -> DbResult<Box<dyn Rows>>;

    /// Runs a query expected to return at most one row.
    ///
    /// Never fails directly; errors surface from [`Row::scan`].
    async fn query_row(&self, sql: &str, args: &[Value]) -> Box<dyn Row> {
        self.query_row_ctx(&Context::background(), sql, args).await
    }

    /// Runs a query expected to return at most one row, honouring `ctx`.
    async fn query_row_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> Box<dyn Row>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnInfo;
    use crate::cursor::{BufferedRows, ResultSet, RowResult};
    use crate::record::Record;
    use crate::value::ValueKind;
    use std::sync::Mutex;

    /// Records which form was called so the default bodies can be checked.
    #[derive(Default)]
    struct Echo {
        calls: Mutex<Vec<String>>,
    }

    impl Echo {
        fn set(sql: &str) -> ResultSet {
            ResultSet::new(
                vec![ColumnInfo::new("sql", "TEXT", ValueKind::String)],
                vec![Record::new(vec!["sql".into()], vec![Value::from(sql)])],
            )
        }
    }

    #[async_trait::async_trait]
    impl Executor for Echo {
        async fn exec_ctx(
            &self,
            ctx: &Context,
            sql: &str,
            args: &[Value],
        ) -> DbResult<ExecResult> {
            ctx.check()?;
            self.calls.lock().unwrap().push(format!("exec_ctx {sql}"));
            Ok(ExecResult::new(args.len() as u64))
        }

        async fn query_ctx(
            &self,
            ctx: &Context,
            sql: &str,
            _args: &[Value],
        ) -> DbResult<Box<dyn Rows>> {
            ctx.check()?;
            self.calls.lock().unwrap().push(format!("query_ctx {sql}"));
            Ok(Box::new(BufferedRows::new(Self::set(sql))))
        }

        async fn query_row_ctx(&self, ctx: &Context, sql: &str, _args: &[Value]) -> Box<dyn Row> {
            self.calls.lock().unwrap().push(format!("query_row_ctx {sql}"));
            RowResult::from_query(ctx.check().map(|()| Self::set(sql))).boxed()
        }
    }

    #[test]
    fn test_exec_result_without_id() {
        let err = ExecResult::new(0).last_insert_id().unwrap_err();
        assert!(matches!(err, DbError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_plain_forms_use_background_context() {
        let echo = Echo::default();
        let result = echo.exec("DELETE FROM t", &[Value::Int(1)]).await.unwrap();
        assert_eq!(result.rows_affected(), 1);

        let mut rows = echo.query("SELECT 1", &[]).await.unwrap();
        assert!(rows.advance());

        let record = echo.query_row("SELECT 2", &[]).await.scan().unwrap();
        assert_eq!(record.get::<String>("sql").unwrap(), "SELECT 2");

        assert_eq!(
            *echo.calls.lock().unwrap(),
            vec!["exec_ctx DELETE FROM t", "query_ctx SELECT 1", "query_row_ctx SELECT 2"]
        );
    }

    #[tokio::test]
    async fn test_query_row_defers_context_error() {
        let echo = Echo::default();
        let ctx = Context::background().with_cancel();
        ctx.cancel();
        let row = echo.query_row_ctx(&ctx, "SELECT 1", &[]).await;
        assert_eq!(row.scan(), Err(DbError::Cancelled));
    }
}
