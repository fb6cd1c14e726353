//! Primary/replica read routing.
//!
//! A [`ReplicaSet`] holds one primary [`Database`] and zero or more replicas.
//! It implements [`Executor`], so it can stand in wherever a single handle is
//! expected:
//!
//! - `exec` and `exec_ctx` always go to the primary.
//! - `query`, `query_ctx`, `query_row`, and `query_row_ctx` go to a replica
//!   chosen by the set's [`ReplicaPicker`], or to the primary when there are
//!   no replicas.
//!
//! Each call is forwarded to exactly one member through the method of the
//! same name, with its arguments untouched. The set never retries, never
//! falls back after an error, and never alters results or errors.
//!
//! # Examples
//!
//! ```no_run
//! use isql_db::{Executor, Opener, ReplicaSet};
//!
//! async fn run(opener: &dyn Opener) -> isql_core::DbResult<()> {
//!     let set = ReplicaSet::open(
//!         opener,
//!         "postgres",
//!         "host=primary user=app",
//!         &["host=replica-a user=app", "host=replica-b user=app"],
//!     )
//!     .await?;
//!
//!     set.exec("UPDATE accounts SET active = true", &[]).await?; // primary
//!     let _rows = set.query("SELECT * FROM accounts", &[]).await?; // a replica
//!     set.close().await
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use isql_core::logging::connection_span;
use isql_core::DbResult;
use tracing::{debug, info, warn, Instrument};

use crate::connection::Database;
use crate::context::Context;
use crate::cursor::{Row, Rows};
use crate::executor::{ExecResult, Executor};
use crate::opener::Opener;
use crate::picker::{ReplicaPicker, ThreadRngPicker};
use crate::value::Value;

/// One primary handle plus a fixed list of replicas.
///
/// Membership never changes after construction. The set is `Send + Sync`;
/// share it between tasks with an `Arc`.
pub struct ReplicaSet {
    primary: Arc<dyn Database>,
    replicas: Vec<Arc<dyn Database>>,
    picker: Box<dyn ReplicaPicker>,
}

impl ReplicaSet {
    /// Opens the primary and every replica with `opener`, picking replicas
    /// with a [`ThreadRngPicker`].
    ///
    /// See [`open_with_picker`](Self::open_with_picker) for the failure
    /// behaviour.
    pub async fn open<S>(
        opener: &dyn Opener,
        driver: &str,
        primary: &str,
        replicas: &[S],
    ) -> DbResult<Self>
    where
        S: AsRef<str> + Sync,
    {
        Self::open_with_picker(opener, Box::new(ThreadRngPicker), driver, primary, replicas).await
    }

    /// Opens the primary and then each replica in order.
    ///
    /// If the primary fails, its error is returned and no replica is
    /// attempted. If replica `k` fails, replicas `0..k` and the primary are
    /// closed, nothing after `k` is attempted, and the open error is returned
    /// unchanged. Errors from those cleanup closes are logged, not returned.
    pub async fn open_with_picker<S>(
        opener: &dyn Opener,
        picker: Box<dyn ReplicaPicker>,
        driver: &str,
        primary: &str,
        replicas: &[S],
    ) -> DbResult<Self>
    where
        S: AsRef<str> + Sync,
    {
        let primary = opener
            .open(driver, primary)
            .instrument(connection_span(driver, "primary", 0))
            .await?;

        let mut opened: Vec<Arc<dyn Database>> = Vec::with_capacity(replicas.len());
        for (index, dsn) in replicas.iter().enumerate() {
            let result = opener
                .open(driver, dsn.as_ref())
                .instrument(connection_span(driver, "replica", index))
                .await;
            match result {
                Ok(db) => opened.push(db),
                Err(err) => {
                    warn!(
                        driver,
                        index,
                        error = %err,
                        "Failed to open replica, closing {} opened connection(s)",
                        opened.len() + 1
                    );
                    close_all(&opened, &primary).await;
                    return Err(err);
                }
            }
        }

        info!(driver, replicas = opened.len(), "Opened replica set");
        Ok(Self::from_parts(primary, opened, picker))
    }

    /// Assembles a set from handles that are already open.
    pub fn from_parts(
        primary: Arc<dyn Database>,
        replicas: Vec<Arc<dyn Database>>,
        picker: Box<dyn ReplicaPicker>,
    ) -> Self {
        Self {
            primary,
            replicas,
            picker,
        }
    }

    /// The primary, which receives every write.
    pub fn primary(&self) -> &dyn Executor {
        self.primary.as_executor()
    }

    /// The replicas, in the order they were given.
    pub fn replicas(&self) -> Vec<&dyn Executor> {
        self.replicas.iter().map(|r| r.as_executor()).collect()
    }

    /// Number of replicas. Zero means reads go to the primary.
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// The driver name reported by the primary.
    pub fn driver_name(&self) -> &str {
        self.primary.driver_name()
    }

    /// Closes the primary and every replica.
    ///
    /// Every member is closed even if an earlier one fails; the first error
    /// is returned.
    pub async fn close(&self) -> DbResult<()> {
        let mut first = None;
        for (role, index, db) in self.members() {
            if let Err(err) = db.close().await {
                warn!(role, index, error = %err, "Failed to close connection");
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn members(&self) -> impl Iterator<Item = (&'static str, usize, &Arc<dyn Database>)> {
        std::iter::once(("primary", 0, &self.primary)).chain(
            self.replicas
                .iter()
                .enumerate()
                .map(|(i, db)| ("replica", i, db)),
        )
    }

    fn read_target(&self, op: &'static str) -> &dyn Database {
        let len = self.replicas.len();
        if len == 0 {
            debug!(op, route = "primary", "Routing read");
            return self.primary.as_ref();
        }
        let picked = self.picker.pick(len);
        if picked >= len {
            warn!(
                op,
                picked,
                replicas = len,
                picker = ?self.picker,
                "Picker index out of range"
            );
        }
        let index = picked % len;
        debug!(op, route = "replica", replica = index, "Routing read");
        self.replicas[index].as_ref()
    }
}

async fn close_all(replicas: &[Arc<dyn Database>], primary: &Arc<dyn Database>) {
    for (index, db) in replicas.iter().enumerate() {
        if let Err(err) = db.close().await {
            warn!(role = "replica", index, error = %err, "Failed to close connection");
        }
    }
    if let Err(err) = primary.close().await {
        warn!(role = "primary", error = %err, "Failed to close connection");
    }
}

impl fmt::Debug for ReplicaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaSet")
            .field("driver", &self.primary.driver_name())
            .field("replicas", &self.replicas.len())
            .field("picker", &self.picker)
            .finish()
    }
}

#[async_trait::async_trait]
impl Executor for ReplicaSet {
    async fn exec(&self, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.primary.exec(sql, args).await
    }

    async fn exec_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.primary.exec_ctx(ctx, sql, args).await
    }

    async fn query(&self, sql: &str, args: &[Value]) -> DbResult<Box<dyn Rows>> {
        self.read_target("query").query(sql, args).await
    }

    async fn query_ctx(
        &self,
        ctx: &Context,
        sql: &str,
        args: &[Value],
    ) -> DbResult<Box<dyn Rows>> {
        self.read_target("query_ctx")
            .query_ctx(ctx, sql, args)
            .await
    }

    async fn query_row(&self, sql: &str, args: &[Value]) -> Box<dyn Row> {
        self.read_target("query_row").query_row(sql, args).await
    }

    async fn query_row_ctx(&self, ctx: &Context, sql: &str, args: &[Value]) -> Box<dyn Row> {
        self.read_target("query_row_ctx")
            .query_row_ctx(ctx, sql, args)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnInfo;
    use crate::connection::{Statement, Transaction, TxOptions};
    use crate::cursor::{BufferedRows, ResultSet, RowResult};
    use crate::record::Record;
    use crate::value::ValueKind;
    use isql_core::DbError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A member that answers every read with its own label.
    struct Labelled {
        label: String,
        writes: AtomicUsize,
        closed: AtomicBool,
        close_error: Option<DbError>,
    }

    impl Labelled {
        fn build(label: &str, close_error: Option<DbError>) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
                writes: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                close_error,
            })
        }

        fn new(label: &str) -> Arc<Self> {
            Self::build(label, None)
        }

        fn failing_close(label: &str) -> Arc<Self> {
            Self::build(label, Some(DbError::OperationalError(format!("{label} stuck"))))
        }

        fn answer(&self) -> ResultSet {
            ResultSet::new(
                vec![ColumnInfo::new("label", "TEXT", ValueKind::String)],
                vec![Record::new(
                    vec!["label".into()],
                    vec![Value::from(self.label.as_str())],
                )],
            )
        }
    }

    #[async_trait::async_trait]
    impl Executor for Labelled {
        async fn exec_ctx(&self, _: &Context, _: &str, _: &[Value]) -> DbResult<ExecResult> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(ExecResult::new(1))
        }

        async fn query_ctx(&self, _: &Context, _: &str, _: &[Value]) -> DbResult<Box<dyn Rows>> {
            Ok(Box::new(BufferedRows::new(self.answer())))
        }

        async fn query_row_ctx(&self, _: &Context, _: &str, _: &[Value]) -> Box<dyn Row> {
            RowResult::from_query(Ok(self.answer())).boxed()
        }
    }

    #[async_trait::async_trait]
    impl Database for Labelled {
        fn driver_name(&self) -> &str {
            "labelled"
        }

        async fn begin_tx(&self, _: &Context, _: TxOptions) -> DbResult<Box<dyn Transaction>> {
            Err(DbError::Unsupported("transactions".into()))
        }

        async fn ping_ctx(&self, _: &Context) -> DbResult<()> {
            Ok(())
        }

        async fn prepare_ctx(&self, _: &Context, _: &str) -> DbResult<Box<dyn Statement>> {
            Err(DbError::Unsupported("statements".into()))
        }

        async fn close(&self) -> DbResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            self.close_error.clone().map_or(Ok(()), Err)
        }

        fn as_executor(&self) -> &dyn Executor {
            self
        }
    }

    /// Replays a fixed list of indices.
    #[derive(Debug)]
    struct Script(Mutex<Vec<usize>>);

    impl ReplicaPicker for Script {
        fn pick(&self, _len: usize) -> usize {
            self.0.lock().unwrap().remove(0)
        }
    }

    fn members(labels: &[&str]) -> Vec<Arc<dyn Database>> {
        labels
            .iter()
            .map(|l| Labelled::new(l) as Arc<dyn Database>)
            .collect()
    }

    async fn label_of(set: &ReplicaSet) -> String {
        set.query_row("SELECT label", &[])
            .await
            .scan()
            .unwrap()
            .get::<String>("label")
            .unwrap()
    }

    #[tokio::test]
    async fn test_reads_follow_picker() {
        let set = ReplicaSet::from_parts(
            Labelled::new("p"),
            members(&["r0", "r1", "r2"]),
            Box::new(Script(Mutex::new(vec![2, 0, 1, 2]))),
        );
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(label_of(&set).await);
        }
        assert_eq!(seen, vec!["r2", "r0", "r1", "r2"]);
    }

    #[tokio::test]
    async fn test_no_replicas_reads_primary() {
        let set = ReplicaSet::from_parts(Labelled::new("p"), Vec::new(), Box::new(ThreadRngPicker));
        assert_eq!(label_of(&set).await, "p");
        let mut rows = set.query("SELECT label", &[]).await.unwrap();
        assert!(rows.advance());
        assert_eq!(rows.scan().unwrap().get::<String>("label").unwrap(), "p");
    }

    #[tokio::test]
    async fn test_writes_go_to_primary() {
        let primary = Labelled::new("p");
        let replica = Labelled::new("r0");
        let set = ReplicaSet::from_parts(
            primary.clone(),
            vec![replica.clone() as Arc<dyn Database>],
            Box::new(ThreadRngPicker),
        );
        set.exec("INSERT", &[]).await.unwrap();
        set.exec_ctx(&Context::background(), "UPDATE", &[])
            .await
            .unwrap();
        assert_eq!(primary.writes.load(Ordering::SeqCst), 2);
        assert_eq!(replica.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_attempts_every_member() {
        let primary = Labelled::failing_close("p");
        let r0 = Labelled::new("r0");
        let r1 = Labelled::failing_close("r1");
        let set = ReplicaSet::from_parts(
            primary.clone(),
            vec![r0.clone() as Arc<dyn Database>, r1.clone()],
            Box::new(ThreadRngPicker),
        );
        let err = set.close().await.unwrap_err();
        assert_eq!(err, DbError::OperationalError("p stuck".into()));
        assert!(primary.closed.load(Ordering::SeqCst));
        assert!(r0.closed.load(Ordering::SeqCst));
        assert!(r1.closed.load(Ordering::SeqCst));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_out_of_range_pick_wraps_and_warns() {
        let logs = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let set = ReplicaSet::from_parts(
            Labelled::new("p"),
            members(&["r0", "r1"]),
            Box::new(Script(Mutex::new(vec![5, 1]))),
        );
        assert_eq!(label_of(&set).await, "r1");
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Picker index out of range"), "{output}");
        assert!(output.contains("picked=5"), "{output}");

        logs.0.lock().unwrap().clear();
        assert_eq!(label_of(&set).await, "r1");
        assert!(logs.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_accessors_preserve_order() {
        let set = ReplicaSet::from_parts(
            Labelled::new("p"),
            members(&["r0", "r1"]),
            Box::new(ThreadRngPicker),
        );
        assert_eq!(set.replica_count(), 2);
        assert_eq!(set.replicas().len(), 2);
        assert_eq!(set.driver_name(), "labelled");
        assert!(format!("{set:?}").contains("replicas: 2"));
    }
}
