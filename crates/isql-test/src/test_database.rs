//! An in-memory SQLite database for tests.
//!
//! [`TestDatabase`] wraps a [`SqliteDatabase`] and counts every executor
//! call made through it, for use with
//! [`assert_num_queries`](crate::assertions::assert_num_queries). It
//! implements [`Database`], so it can serve as a real member of a
//! [`ReplicaSet`](isql_db::ReplicaSet).
//!
//! ## Example
//!
//! ```rust,no_run
//! use isql_test::test_database::TestDatabase;
//!
//! async fn example() {
//!     let db = TestDatabase::new();
//!     db.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
//!         .await
//!         .unwrap();
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use isql_core::DbResult;
use isql_db::{
    Context, Database, ExecResult, Executor, Row, Rows, Statement, Transaction, TxOptions, Value,
};
use isql_db_backends::sqlite::SqliteDatabase;

/// An in-memory SQLite database with a query counter.
///
/// Each `TestDatabase::new()` is a fresh, isolated database. Clones share
/// the database and the counter.
#[derive(Clone)]
pub struct TestDatabase {
    inner: Arc<SqliteDatabase>,
    query_count: Arc<AtomicUsize>,
}

impl TestDatabase {
    /// Creates a new in-memory SQLite test database.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory database cannot be created.
    pub fn new() -> Self {
        let inner = SqliteDatabase::memory().expect("Failed to create in-memory SQLite database");
        Self {
            inner: Arc::new(inner),
            query_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Executes a raw SQL string with no parameters.
    ///
    /// Increments the query counter.
    pub async fn execute_raw(&self, sql: &str) -> DbResult<u64> {
        self.exec(sql, &[]).await.map(|r| r.rows_affected())
    }

    /// Returns the current query count.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Resets the query counter to zero.
    pub fn reset_query_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }

    /// Returns the wrapped SQLite handle. Calls made on it are not counted.
    pub fn inner(&self) -> &SqliteDatabase {
        &self.inner
    }

    /// Drops all user-created tables.
    pub async fn teardown(&self) -> DbResult<()> {
        let mut rows = self
            .inner
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                &[],
            )
            .await?;
        let tables = isql_db::collect_records(rows.as_mut())?;
        for row in &tables {
            let table_name: String = row.get("name")?;
            self.inner
                .exec(&format!("DROP TABLE IF EXISTS \"{table_name}\""), &[])
                .await?;
        }
        Ok(())
    }

    fn count(&self) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for TestDatabase {
    async fn exec_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.count();
        self.inner.exec_ctx(ctx, sql, args).await
    }

    async fn query_ctx(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[Value],
    ) -> DbResult<Box<dyn Rows>> {
        self.count();
        self.inner.query_ctx(ctx, sql, args).await
    }

    async fn query_row_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> Box<dyn Row> {
        self.count();
        self.inner.query_row_ctx(ctx, sql, args).await
    }
}

#[async_trait::async_trait]
impl Database for TestDatabase {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> DbResult<Box<dyn Transaction>> {
        self.inner.begin_tx(ctx, opts).await
    }

    async fn ping_ctx(&self, ctx: &Context) -> DbResult<()> {
        self.inner.ping_ctx(ctx).await
    }

    async fn prepare_ctx(&self, ctx: &Context, sql: &str) -> DbResult<Box<dyn Statement>> {
        self.inner.prepare_ctx(ctx, sql).await
    }

    async fn close(&self) -> DbResult<()> {
        self.inner.close().await
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}
