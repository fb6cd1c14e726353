//! A recording fake [`Database`].
//!
//! [`FakeDatabase`] answers every call from canned data and logs it as a
//! [`Call`], so tests can assert exactly which handle received which method.
//! By default a query returns one row with a single `label` column holding
//! the fake's label, which makes the serving member visible in results.
//!
//! ## Example
//!
//! ```rust
//! use isql_db::Executor;
//! use isql_test::fake::{FakeDatabase, Method};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let db = FakeDatabase::new("replica-0");
//! let record = db.query_row("SELECT 1", &[]).await.scan().unwrap();
//! assert_eq!(record.get::<String>("label").unwrap(), "replica-0");
//! assert_eq!(db.count(Method::QueryRow), 1);
//! # });
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use isql_core::{DbError, DbResult};
use isql_db::{
    BufferedRows, ColumnInfo, Context, Database, ExecResult, Executor, Record, ResultSet, Row,
    RowResult, Rows, Statement, Transaction, TxOptions, Value, ValueKind,
};

/// The operation a [`Call`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Exec,
    ExecCtx,
    Query,
    QueryCtx,
    QueryRow,
    QueryRowCtx,
    Begin,
    Commit,
    Rollback,
    Prepare,
    Ping,
    Close,
}

impl Method {
    /// The six executor operations.
    pub const EXECUTOR: [Self; 6] = [
        Self::Exec,
        Self::ExecCtx,
        Self::Query,
        Self::QueryCtx,
        Self::QueryRow,
        Self::QueryRowCtx,
    ];

    /// Whether this is one of the four read operations.
    pub const fn is_read(self) -> bool {
        matches!(
            self,
            Self::Query | Self::QueryCtx | Self::QueryRow | Self::QueryRowCtx
        )
    }

    /// Whether this is `exec` or `exec_ctx`.
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Exec | Self::ExecCtx)
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    /// Statement text; empty for calls that take none.
    pub sql: String,
    pub args: Vec<Value>,
}

struct State {
    label: String,
    driver: String,
    calls: Mutex<Vec<Call>>,
    rows: Mutex<ResultSet>,
    exec_result: Mutex<ExecResult>,
    error: Mutex<Option<DbError>>,
    close_error: Mutex<Option<DbError>>,
    closed: AtomicBool,
    close_count: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl State {
    fn record(&self, method: Method, sql: &str, args: &[Value]) {
        lock(&self.calls).push(Call {
            method,
            sql: sql.to_string(),
            args: args.to_vec(),
        });
    }

    fn check(&self, ctx: Option<&Context>) -> DbResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::ConnectionClosed);
        }
        if let Some(ctx) = ctx {
            ctx.check()?;
        }
        lock(&self.error).clone().map_or(Ok(()), Err)
    }

    fn exec(&self, method: Method, ctx: Option<&Context>, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.record(method, sql, args);
        self.check(ctx)?;
        Ok(*lock(&self.exec_result))
    }

    fn query(&self, method: Method, ctx: Option<&Context>, sql: &str, args: &[Value]) -> DbResult<ResultSet> {
        self.record(method, sql, args);
        self.check(ctx)?;
        Ok(lock(&self.rows).clone())
    }
}

/// A fake database handle that records every call.
///
/// Cloning is cheap and clones share the same log and configuration.
#[derive(Clone)]
pub struct FakeDatabase {
    state: Arc<State>,
}

impl FakeDatabase {
    /// Creates a fake whose queries answer with `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_driver(label, "fake")
    }

    /// Creates a fake reporting `driver` as its driver name.
    pub fn with_driver(label: impl Into<String>, driver: impl Into<String>) -> Self {
        let label = label.into();
        let rows = Self::label_rows(&label);
        Self {
            state: Arc::new(State {
                label,
                driver: driver.into(),
                calls: Mutex::new(Vec::new()),
                rows: Mutex::new(rows),
                exec_result: Mutex::new(ExecResult::new(1)),
                error: Mutex::new(None),
                close_error: Mutex::new(None),
                closed: AtomicBool::new(false),
                close_count: AtomicUsize::new(0),
            }),
        }
    }

    fn label_rows(label: &str) -> ResultSet {
        ResultSet::new(
            vec![ColumnInfo::new("label", "TEXT", ValueKind::String)],
            vec![Record::new(vec!["label".into()], vec![Value::from(label)])],
        )
    }

    /// The label given at construction.
    pub fn label(&self) -> &str {
        &self.state.label
    }

    /// Replaces the rows returned by queries.
    pub fn set_rows(&self, rows: ResultSet) {
        *lock(&self.state.rows) = rows;
    }

    /// Replaces the result returned by `exec`.
    pub fn set_exec_result(&self, result: ExecResult) {
        *lock(&self.state.exec_result) = result;
    }

    /// Makes every subsequent operation fail with `err` (after recording
    /// the call). `None` restores normal behaviour.
    pub fn set_error(&self, err: Option<DbError>) {
        *lock(&self.state.error) = err;
    }

    /// Makes [`Database::close`] return `err`. The fake is still marked
    /// closed.
    pub fn set_close_error(&self, err: Option<DbError>) {
        *lock(&self.state.close_error) = err;
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state.calls).clone()
    }

    /// Number of calls of `method`.
    pub fn count(&self, method: Method) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Number of read calls (`query*`, `query_row*`).
    pub fn reads(&self) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.method.is_read())
            .count()
    }

    /// Number of write calls (`exec*`).
    pub fn writes(&self) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.method.is_write())
            .count()
    }

    /// Forgets all recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// How many times `close` has been called.
    pub fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FakeDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDatabase")
            .field("label", &self.state.label)
            .field("calls", &lock(&self.state.calls).len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait::async_trait]
impl Executor for FakeDatabase {
    async fn exec(&self, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.state.exec(Method::Exec, None, sql, args)
    }

    async fn exec_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.state.exec(Method::ExecCtx, Some(ctx), sql, args)
    }

    async fn query(&self, sql: &str, args: &[Value]) -> DbResult<Box<dyn Rows>> {
        let set = self.state.query(Method::Query, None, sql, args)?;
        Ok(Box::new(BufferedRows::new(set)))
    }

    async fn query_ctx(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[Value],
    ) -> DbResult<Box<dyn Rows>> {
        let set = self.state.query(Method::QueryCtx, Some(ctx), sql, args)?;
        Ok(Box::new(BufferedRows::new(set)))
    }

    async fn query_row(&self, sql: &str, args: &[Value]) -> Box<dyn Row> {
        RowResult::from_query(self.state.query(Method::QueryRow, None, sql, args)).boxed()
    }

    async fn query_row_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> Box<dyn Row> {
        RowResult::from_query(self.state.query(Method::QueryRowCtx, Some(ctx), sql, args)).boxed()
    }
}

#[async_trait::async_trait]
impl Database for FakeDatabase {
    fn driver_name(&self) -> &str {
        &self.state.driver
    }

    async fn begin_tx(&self, ctx: &Context, _opts: TxOptions) -> DbResult<Box<dyn Transaction>> {
        self.state.record(Method::Begin, "", &[]);
        self.state.check(Some(ctx))?;
        Ok(Box::new(FakeTransaction {
            state: self.state.clone(),
            done: Arc::new(AtomicBool::new(false)),
        }))
    }

    async fn ping_ctx(&self, ctx: &Context) -> DbResult<()> {
        self.state.record(Method::Ping, "", &[]);
        self.state.check(Some(ctx))
    }

    async fn prepare_ctx(&self, ctx: &Context, sql: &str) -> DbResult<Box<dyn Statement>> {
        self.state.record(Method::Prepare, sql, &[]);
        self.state.check(Some(ctx))?;
        Ok(Box::new(FakeStatement::new(self.state.clone(), sql, None)))
    }

    async fn close(&self) -> DbResult<()> {
        self.state.record(Method::Close, "", &[]);
        self.state.close_count.fetch_add(1, Ordering::AcqRel);
        self.state.closed.store(true, Ordering::Release);
        lock(&self.state.close_error).clone().map_or(Ok(()), Err)
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}

/// A transaction on a [`FakeDatabase`]. Its calls land in the same log.
pub struct FakeTransaction {
    state: Arc<State>,
    done: Arc<AtomicBool>,
}

impl FakeTransaction {
    fn ensure_active(&self) -> DbResult<()> {
        if self.done.load(Ordering::Acquire) {
            Err(DbError::TxDone)
        } else {
            Ok(())
        }
    }

    fn finish(&self, method: Method) -> DbResult<()> {
        if self.done.swap(true, Ordering::AcqRel) {
            return Err(DbError::TxDone);
        }
        self.state.record(method, "", &[]);
        self.state.check(None)
    }
}

#[async_trait::async_trait]
impl Executor for FakeTransaction {
    async fn exec_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.ensure_active()?;
        self.state.exec(Method::ExecCtx, Some(ctx), sql, args)
    }

    async fn query_ctx(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[Value],
    ) -> DbResult<Box<dyn Rows>> {
        self.ensure_active()?;
        let set = self.state.query(Method::QueryCtx, Some(ctx), sql, args)?;
        Ok(Box::new(BufferedRows::new(set)))
    }

    async fn query_row_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> Box<dyn Row> {
        let result = self
            .ensure_active()
            .and_then(|()| self.state.query(Method::QueryRowCtx, Some(ctx), sql, args));
        RowResult::from_query(result).boxed()
    }
}

#[async_trait::async_trait]
impl Transaction for FakeTransaction {
    async fn commit(&self) -> DbResult<()> {
        self.finish(Method::Commit)
    }

    async fn rollback(&self) -> DbResult<()> {
        self.finish(Method::Rollback)
    }

    async fn prepare_ctx(&self, ctx: &Context, sql: &str) -> DbResult<Box<dyn Statement>> {
        self.ensure_active()?;
        self.state.record(Method::Prepare, sql, &[]);
        self.state.check(Some(ctx))?;
        Ok(Box::new(FakeStatement::new(
            self.state.clone(),
            sql,
            Some(self.done.clone()),
        )))
    }

    async fn stmt_ctx(
        &self,
        ctx: &Context,
        stmt: &dyn Statement,
    ) -> DbResult<Box<dyn Statement>> {
        self.prepare_ctx(ctx, stmt.sql()).await
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}

/// A statement prepared on a [`FakeDatabase`] or [`FakeTransaction`].
pub struct FakeStatement {
    state: Arc<State>,
    sql: String,
    tx_done: Option<Arc<AtomicBool>>,
    closed: AtomicBool,
}

impl FakeStatement {
    fn new(state: Arc<State>, sql: &str, tx_done: Option<Arc<AtomicBool>>) -> Self {
        Self {
            state,
            sql: sql.to_string(),
            tx_done,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_usable(&self) -> DbResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::StmtClosed);
        }
        match &self.tx_done {
            Some(done) if done.load(Ordering::Acquire) => Err(DbError::TxDone),
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Statement for FakeStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn exec_ctx(&self, ctx: &Context, args: &[Value]) -> DbResult<ExecResult> {
        self.ensure_usable()?;
        self.state.exec(Method::ExecCtx, Some(ctx), &self.sql, args)
    }

    async fn query_ctx(&self, ctx: &Context, args: &[Value]) -> DbResult<Box<dyn Rows>> {
        self.ensure_usable()?;
        let set = self.state.query(Method::QueryCtx, Some(ctx), &self.sql, args)?;
        Ok(Box::new(BufferedRows::new(set)))
    }

    async fn query_row_ctx(&self, ctx: &Context, args: &[Value]) -> Box<dyn Row> {
        let result = self
            .ensure_usable()
            .and_then(|()| self.state.query(Method::QueryRowCtx, Some(ctx), &self.sql, args));
        RowResult::from_query(result).boxed()
    }

    async fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
