//! SQLite driver using `rusqlite`.
//!
//! [`SqliteDatabase`] wraps a single `rusqlite::Connection` behind an async
//! mutex and runs every call through `tokio::task::spawn_blocking`, so the
//! async API never blocks the runtime.
//!
//! Features:
//! - In-memory databases via `:memory:` (each open gets its own database)
//! - `sqlite://` prefixed connection strings
//! - Transactions hold the connection exclusively until they finish
//! - Cancelled calls interrupt the running statement

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use isql_core::{DbError, DbResult};
use isql_db::{
    BufferedRows, ColumnInfo, Context, Database, ExecResult, Executor, Record, ResultSet, Row,
    RowResult, Rows, Statement, Transaction, TxOptions, Value, ValueKind,
};
use rusqlite::types::ValueRef;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// The connection plus the gate that keeps transactions exclusive.
struct Shared {
    /// `None` once the database is closed.
    conn: Arc<Mutex<Option<rusqlite::Connection>>>,
    /// Held by every database-level call for its duration, and by an open
    /// transaction until it finishes.
    gate: Arc<Mutex<()>>,
    interrupt: rusqlite::InterruptHandle,
}

impl Shared {
    /// Runs `f` against the connection on the blocking pool.
    ///
    /// `permit` is released only after `f` returns. On cancellation the
    /// running statement is interrupted and the call still waits for it: a
    /// statement that completed anyway reports its real outcome, and only one
    /// that never ran or was actually interrupted reports the context error.
    async fn run<T, F>(
        &self,
        ctx: &Context,
        permit: Option<OwnedMutexGuard<()>>,
        f: F,
    ) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> DbResult<T> + Send + 'static,
    {
        ctx.check()?;
        let conn = self.conn.clone();
        let task_ctx = ctx.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let guard = conn.blocking_lock();
            let conn = guard.as_ref().ok_or(DbError::ConnectionClosed)?;
            // Cancelled while queued: nothing has run yet.
            task_ctx.check()?;
            f(conn)
        });
        match ctx.guard(&mut task).await {
            Ok(joined) => flatten(joined),
            Err(err) => {
                self.interrupt.interrupt();
                match flatten(task.await) {
                    Err(e) if e.is_context_error() => Err(err),
                    outcome => outcome,
                }
            }
        }
    }

    async fn acquire(&self, ctx: &Context) -> DbResult<OwnedMutexGuard<()>> {
        ctx.guard(self.gate.clone().lock_owned()).await
    }
}

fn flatten<T>(joined: Result<DbResult<T>, tokio::task::JoinError>) -> DbResult<T> {
    joined.map_err(|e| DbError::OperationalError(format!("Task join error: {e}")))?
}

/// Where a call runs: directly on the database, or inside a transaction.
#[derive(Clone)]
enum Scope {
    Database(Arc<Shared>),
    Transaction(Arc<TxState>),
}

impl Scope {
    async fn run<T, F>(&self, ctx: &Context, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> DbResult<T> + Send + 'static,
    {
        match self {
            Self::Database(shared) => {
                let permit = shared.acquire(ctx).await?;
                shared.run(ctx, Some(permit), f).await
            }
            Self::Transaction(tx) => {
                // Holding the slot keeps commit/rollback from racing this call.
                let slot = ctx.guard(tx.active.lock()).await?;
                if slot.is_none() {
                    return Err(DbError::TxDone);
                }
                let result = tx.shared.run(ctx, None, f).await;
                drop(slot);
                result
            }
        }
    }

    async fn exec(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        let sql = sql.to_string();
        let args = args.to_vec();
        self.run(ctx, move |conn| exec_blocking(conn, &sql, &args))
            .await
    }

    async fn query(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ResultSet> {
        let sql = sql.to_string();
        let args = args.to_vec();
        self.run(ctx, move |conn| query_blocking(conn, &sql, &args))
            .await
    }

    async fn prepare(&self, ctx: &Context, sql: &str) -> DbResult<SqliteStatement> {
        let text = sql.to_string();
        self.run(ctx, move |conn| {
            conn.prepare_cached(&text).map(drop).map_err(map_err)
        })
        .await?;
        Ok(SqliteStatement {
            sql: sql.to_string(),
            scope: self.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

/// A SQLite database handle.
///
/// # Examples
///
/// ```
/// use isql_db::{Executor, Value};
/// use isql_db_backends::sqlite::SqliteDatabase;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let db = SqliteDatabase::memory().unwrap();
/// db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).await.unwrap();
/// let result = db.exec("INSERT INTO t (name) VALUES (?)", &[Value::from("a")]).await.unwrap();
/// assert_eq!(result.last_insert_id().unwrap(), 1);
/// # });
/// ```
pub struct SqliteDatabase {
    /// The database file path (or ":memory:").
    path: String,
    shared: Arc<Shared>,
}

impl SqliteDatabase {
    /// Opens the database named by `dsn`: `:memory:`, a file path, or either
    /// prefixed with `sqlite://`.
    ///
    /// This is blocking; async callers should go through
    /// [`DriverOpener`](crate::DriverOpener), which runs it on the blocking
    /// pool. Foreign keys are enforced and file databases use WAL mode.
    pub fn open(dsn: &str) -> DbResult<Self> {
        let path = dsn.strip_prefix("sqlite://").unwrap_or(dsn);
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(path)
        }
        .map_err(|e| DbError::OperationalError(format!("SQLite open failed: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| DbError::OperationalError(format!("Failed to set pragmas: {e}")))?;

        debug!(path, "Opened SQLite database");
        let interrupt = conn.get_interrupt_handle();
        Ok(Self {
            path: path.to_string(),
            shared: Arc::new(Shared {
                conn: Arc::new(Mutex::new(Some(conn))),
                gate: Arc::new(Mutex::new(())),
                interrupt,
            }),
        })
    }

    /// Opens a private in-memory database.
    pub fn memory() -> DbResult<Self> {
        Self::open(":memory:")
    }

    /// The database file path, or `:memory:`.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn scope(&self) -> Scope {
        Scope::Database(self.shared.clone())
    }
}

#[async_trait::async_trait]
impl Executor for SqliteDatabase {
    async fn exec_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.scope().exec(ctx, sql, args).await
    }

    async fn query_ctx(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[Value],
    ) -> DbResult<Box<dyn Rows>> {
        let set = self.scope().query(ctx, sql, args).await?;
        Ok(Box::new(BufferedRows::new(set)))
    }

    async fn query_row_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> Box<dyn Row> {
        RowResult::from_query(self.scope().query(ctx, sql, args).await).boxed()
    }
}

#[async_trait::async_trait]
impl Database for SqliteDatabase {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    /// SQLite transactions are always serializable, so every isolation level
    /// is accepted. `read_only` sets `PRAGMA query_only` for the duration.
    ///
    /// `ctx` bounds the wait for the connection; `BEGIN` itself runs to
    /// completion so the connection is never left half-opened.
    async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> DbResult<Box<dyn Transaction>> {
        let permit = self.shared.acquire(ctx).await?;
        let read_only = opts.read_only;
        self.shared
            .run(&Context::background(), None, move |conn| {
                conn.execute_batch("BEGIN").map_err(map_err)?;
                if read_only {
                    if let Err(e) = conn.execute_batch("PRAGMA query_only = ON") {
                        let _ = conn.execute_batch("ROLLBACK");
                        return Err(map_err(e));
                    }
                }
                Ok(())
            })
            .await?;
        debug!(isolation = %opts.isolation, read_only, "Began SQLite transaction");
        Ok(Box::new(SqliteTransaction {
            state: Arc::new(TxState {
                shared: self.shared.clone(),
                active: Mutex::new(Some(permit)),
                read_only,
            }),
        }))
    }

    async fn ping_ctx(&self, ctx: &Context) -> DbResult<()> {
        self.scope()
            .run(ctx, |conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(map_err)
            })
            .await
    }

    async fn prepare_ctx(&self, ctx: &Context, sql: &str) -> DbResult<Box<dyn Statement>> {
        Ok(Box::new(self.scope().prepare(ctx, sql).await?))
    }

    /// Closes the connection. An open transaction is rolled back by SQLite
    /// and its later calls fail with [`DbError::ConnectionClosed`].
    async fn close(&self) -> DbResult<()> {
        let conn = self.shared.conn.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let Some(conn) = conn.blocking_lock().take() else {
                return Ok(());
            };
            debug!(path = %path, "Closing SQLite database");
            conn.close().map_err(|(_, e)| {
                DbError::OperationalError(format!("SQLite close failed: {e}"))
            })
        })
        .await
        .map_err(|e| DbError::OperationalError(format!("Task join error: {e}")))?
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}

/// Transaction state shared with statements bound to the transaction.
struct TxState {
    shared: Arc<Shared>,
    /// The gate permit while the transaction is open; `None` once finished.
    active: Mutex<Option<OwnedMutexGuard<()>>>,
    read_only: bool,
}

impl TxState {
    async fn finish(&self, sql: &'static str) -> DbResult<()> {
        let permit = self.active.lock().await.take().ok_or(DbError::TxDone)?;
        let read_only = self.read_only;
        self.shared
            .run(&Context::background(), Some(permit), move |conn| {
                finish_blocking(conn, sql, read_only)
            })
            .await
    }
}

/// Ends the transaction with `sql`, leaving the connection in autocommit
/// mode whatever happens.
fn finish_blocking(conn: &rusqlite::Connection, sql: &str, read_only: bool) -> DbResult<()> {
    let result = conn.execute_batch(sql).map_err(map_err);
    if result.is_err() && !conn.is_autocommit() {
        let _ = conn.execute_batch("ROLLBACK");
    }
    if read_only {
        let _ = conn.execute_batch("PRAGMA query_only = OFF");
    }
    result
}

/// An open SQLite transaction.
pub struct SqliteTransaction {
    state: Arc<TxState>,
}

impl SqliteTransaction {
    fn scope(&self) -> Scope {
        Scope::Transaction(self.state.clone())
    }
}

#[async_trait::async_trait]
impl Executor for SqliteTransaction {
    async fn exec_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.scope().exec(ctx, sql, args).await
    }

    async fn query_ctx(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[Value],
    ) -> DbResult<Box<dyn Rows>> {
        let set = self.scope().query(ctx, sql, args).await?;
        Ok(Box::new(BufferedRows::new(set)))
    }

    async fn query_row_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> Box<dyn Row> {
        RowResult::from_query(self.scope().query(ctx, sql, args).await).boxed()
    }
}

#[async_trait::async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(&self) -> DbResult<()> {
        self.state.finish("COMMIT").await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.state.finish("ROLLBACK").await
    }

    async fn prepare_ctx(&self, ctx: &Context, sql: &str) -> DbResult<Box<dyn Statement>> {
        Ok(Box::new(self.scope().prepare(ctx, sql).await?))
    }

    async fn stmt_ctx(
        &self,
        ctx: &Context,
        stmt: &dyn Statement,
    ) -> DbResult<Box<dyn Statement>> {
        Ok(Box::new(self.scope().prepare(ctx, stmt.sql()).await?))
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        let state = self.state.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                match state.finish("ROLLBACK").await {
                    Ok(()) => debug!("Rolled back abandoned SQLite transaction"),
                    Err(DbError::TxDone) => {}
                    Err(e) => warn!(error = %e, "Failed to roll back abandoned transaction"),
                }
            });
            return;
        }
        // No runtime: nothing else can be using the connection right now.
        let Ok(mut slot) = state.active.try_lock() else {
            return;
        };
        if let Some(permit) = slot.take() {
            let guard = state.shared.conn.blocking_lock();
            if let Some(conn) = guard.as_ref() {
                if let Err(e) = finish_blocking(conn, "ROLLBACK", state.read_only) {
                    warn!(error = %e, "Failed to roll back abandoned transaction");
                }
            }
            drop(guard);
            drop(permit);
        }
    }
}

/// A prepared SQLite statement.
///
/// The compiled form lives in the connection's statement cache; this handle
/// keeps the SQL text and the scope it was prepared in.
pub struct SqliteStatement {
    sql: String,
    scope: Scope,
    closed: AtomicBool,
}

impl SqliteStatement {
    fn ensure_open(&self) -> DbResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DbError::StmtClosed)
        } else {
            Ok(())
        }
    }

    async fn query_set(&self, ctx: &Context, args: &[Value]) -> DbResult<ResultSet> {
        self.ensure_open()?;
        self.scope.query(ctx, &self.sql, args).await
    }
}

#[async_trait::async_trait]
impl Statement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn exec_ctx(&self, ctx: &Context, args: &[Value]) -> DbResult<ExecResult> {
        self.ensure_open()?;
        self.scope.exec(ctx, &self.sql, args).await
    }

    async fn query_ctx(&self, ctx: &Context, args: &[Value]) -> DbResult<Box<dyn Rows>> {
        let set = self.query_set(ctx, args).await?;
        Ok(Box::new(BufferedRows::new(set)))
    }

    async fn query_row_ctx(&self, ctx: &Context, args: &[Value]) -> Box<dyn Row> {
        RowResult::from_query(self.query_set(ctx, args).await).boxed()
    }

    async fn close(&self) -> DbResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── blocking helpers ───────────────────────────────────────────────────

fn map_err(e: rusqlite::Error) -> DbError {
    match &e {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ffi::ErrorCode::ConstraintViolation =>
        {
            DbError::IntegrityError(format!("{e}"))
        }
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ffi::ErrorCode::OperationInterrupted =>
        {
            DbError::Cancelled
        }
        _ => DbError::DatabaseError(format!("{e}")),
    }
}

fn exec_blocking(conn: &rusqlite::Connection, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
    let mut stmt = conn.prepare_cached(sql).map_err(map_err)?;
    bind_params(&mut stmt, args)?;
    let count = match stmt.raw_execute() {
        Ok(count) => count,
        // Statements that return rows may still be exec'd; the rows are discarded.
        Err(rusqlite::Error::ExecuteReturnedResults) => 0,
        Err(e) => return Err(map_err(e)),
    };
    Ok(ExecResult::new(count as u64).with_last_insert_id(conn.last_insert_rowid()))
}

fn query_blocking(conn: &rusqlite::Connection, sql: &str, args: &[Value]) -> DbResult<ResultSet> {
    let mut stmt = conn.prepare_cached(sql).map_err(map_err)?;
    let columns = column_infos(&stmt);
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    bind_params(&mut stmt, args)?;

    let mut raw_rows = stmt.raw_query();
    let mut records = Vec::new();
    while let Some(row) = raw_rows.next().map_err(map_err)? {
        records.push(convert_row(row, &names, &columns)?);
    }
    Ok(ResultSet::new(columns, records))
}

/// Binds `Value`s to a statement, replacing any earlier bindings.
fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> DbResult<()> {
    let expected = stmt.parameter_count();
    if params.len() != expected {
        return Err(DbError::DatabaseError(format!(
            "Expected {expected} arguments, got {}",
            params.len()
        )));
    }
    for (i, param) in params.iter().enumerate() {
        let idx = i + 1;
        match param {
            Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
            Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
            Value::Int(v) => stmt.raw_bind_parameter(idx, v),
            Value::Float(v) => stmt.raw_bind_parameter(idx, v),
            Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
            Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
            Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string().as_str()),
            Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string().as_str()),
            Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339().as_str()),
            Value::Time(t) => stmt.raw_bind_parameter(idx, t.to_string().as_str()),
            Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string().as_str()),
            Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string().as_str()),
        }
        .map_err(|e| DbError::DatabaseError(format!("Bind error: {e}")))?;
    }
    Ok(())
}

fn column_infos(stmt: &rusqlite::Statement<'_>) -> Vec<ColumnInfo> {
    stmt.columns()
        .iter()
        .map(|col| {
            let decl = col.decl_type().unwrap_or("");
            ColumnInfo::new(col.name(), decl, affinity(decl))
        })
        .collect()
}

/// Maps a declared column type to the kind of value it yields, following
/// SQLite's type affinity rules. Expressions have no declared type and report
/// [`ValueKind::Null`], meaning any kind may appear.
fn affinity(decl: &str) -> ValueKind {
    let t = decl.to_uppercase();
    if t.is_empty() {
        ValueKind::Null
    } else if t.contains("BOOL") {
        ValueKind::Bool
    } else if t.contains("INT") {
        ValueKind::Int
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        ValueKind::String
    } else if t.contains("BLOB") {
        ValueKind::Bytes
    } else {
        ValueKind::Float
    }
}

fn convert_row(
    row: &rusqlite::Row<'_>,
    names: &[String],
    columns: &[ColumnInfo],
) -> DbResult<Record> {
    use isql_db::ColumnType;

    let values = columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let raw = row
                .get_ref(i)
                .map_err(|e| DbError::ConversionError(format!("Column {i}: {e}")))?;
            Ok(convert_value(raw, col.scan_type()))
        })
        .collect::<DbResult<Vec<_>>>()?;
    Ok(Record::new(names.to_vec(), values))
}

fn convert_value(raw: ValueRef<'_>, scan_type: ValueKind) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) if scan_type == ValueKind::Bool => Value::Bool(v != 0),
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}
