//! Result cursors and single-row accessors.
//!
//! [`Rows`] is the multi-row cursor returned by `query`; [`Row`] is the
//! single-row accessor returned by `query_row`, which defers every error
//! (including "no rows") to [`Row::scan`].
//!
//! Drivers in this workspace materialize results before handing them out, so
//! both traits have one shared implementation here: [`BufferedRows`] and
//! [`RowResult`].

use std::collections::VecDeque;

use isql_core::{DbError, DbResult};

use crate::column::{ColumnInfo, ColumnType};
use crate::record::Record;

/// A forward-only cursor over one or more result sets.
///
/// The cursor starts *before* the first row: call [`advance`](Self::advance)
/// and then [`scan`](Self::scan) for each row.
///
/// ```
/// use isql_db::{BufferedRows, ColumnInfo, Record, ResultSet, Rows, Value, ValueKind};
///
/// let set = ResultSet::new(
///     vec![ColumnInfo::new("n", "INTEGER", ValueKind::Int)],
///     vec![Record::new(vec!["n".into()], vec![Value::Int(1)])],
/// );
/// let mut rows = BufferedRows::new(set);
/// while rows.advance() {
///     let record = rows.scan().unwrap();
///     assert_eq!(record.get::<i64>("n").unwrap(), 1);
/// }
/// assert!(rows.err().is_none());
/// ```
pub trait Rows: Send {
    /// Column names of the current result set.
    fn columns(&self) -> DbResult<Vec<String>>;

    /// Column metadata of the current result set.
    fn column_types(&self) -> DbResult<Vec<Box<dyn ColumnType>>>;

    /// Moves to the next row. Returns `false` at the end of the current
    /// result set, after an error, or once the cursor is closed.
    fn advance(&mut self) -> bool;

    /// Moves to the next result set, positioned before its first row.
    /// Returns `false` if there is none.
    fn next_result_set(&mut self) -> bool;

    /// Returns the row the cursor is positioned on.
    fn scan(&self) -> DbResult<Record>;

    /// The error that ended iteration early, if any.
    fn err(&self) -> Option<&DbError>;

    /// Releases the cursor. Closing twice is harmless.
    fn close(&mut self) -> DbResult<()>;
}

/// A single-row accessor.
///
/// Errors from the query itself surface from [`scan`](Self::scan), so
/// `query_row` can return the accessor without a `Result`.
pub trait Row: Send {
    /// Returns the first row of the result, or [`DbError::NoRows`] if the
    /// result was empty.
    fn scan(self: Box<Self>) -> DbResult<Record>;
}

/// One materialized result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    columns: Vec<ColumnInfo>,
    records: Vec<Record>,
}

impl ResultSet {
    /// Creates a result set from column metadata and rows.
    pub const fn new(columns: Vec<ColumnInfo>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    /// Column metadata.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// The rows, in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consumes the set, returning its rows.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the set has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A [`Rows`] implementation over fully materialized result sets.
#[derive(Debug, Default)]
pub struct BufferedRows {
    current: ResultSet,
    pending: VecDeque<ResultSet>,
    position: Option<usize>,
    closed: bool,
    err: Option<DbError>,
}

impl BufferedRows {
    /// Creates a cursor over a single result set.
    pub fn new(set: ResultSet) -> Self {
        Self {
            current: set,
            ..Self::default()
        }
    }

    /// Creates a cursor over several result sets, starting at the first.
    pub fn from_sets(sets: impl IntoIterator<Item = ResultSet>) -> Self {
        let mut pending: VecDeque<ResultSet> = sets.into_iter().collect();
        let current = pending.pop_front().unwrap_or_default();
        Self {
            current,
            pending,
            ..Self::default()
        }
    }

    /// Records an error that ended iteration early. [`Rows::advance`] stops
    /// after the buffered rows and [`Rows::err`] reports it.
    #[must_use]
    pub fn with_error(mut self, err: DbError) -> Self {
        self.err = Some(err);
        self
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.closed {
            Err(DbError::RowsClosed)
        } else {
            Ok(())
        }
    }
}

impl Rows for BufferedRows {
    fn columns(&self) -> DbResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .current
            .columns
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    fn column_types(&self) -> DbResult<Vec<Box<dyn ColumnType>>> {
        self.ensure_open()?;
        Ok(self
            .current
            .columns
            .iter()
            .map(|c| Box::new(c.clone()) as Box<dyn ColumnType>)
            .collect())
    }

    fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let next = self.position.map_or(0, |p| p + 1);
        // Park one past the end so scan() reports NoCurrentRow afterwards.
        self.position = Some(next.min(self.current.len()));
        next < self.current.len()
    }

    fn next_result_set(&mut self) -> bool {
        if self.closed || self.err.is_some() {
            return false;
        }
        match self.pending.pop_front() {
            Some(set) => {
                self.current = set;
                self.position = None;
                true
            }
            None => false,
        }
    }

    fn scan(&self) -> DbResult<Record> {
        self.ensure_open()?;
        self.position
            .and_then(|p| self.current.records.get(p))
            .cloned()
            .ok_or(DbError::NoCurrentRow)
    }

    fn err(&self) -> Option<&DbError> {
        self.err.as_ref()
    }

    fn close(&mut self) -> DbResult<()> {
        self.closed = true;
        self.pending.clear();
        Ok(())
    }
}

/// A [`Row`] implementation holding the outcome of a single-row query.
#[derive(Debug, Clone, PartialEq)]
pub struct RowResult {
    outcome: DbResult<Record>,
}

impl RowResult {
    /// An accessor that yields `record`.
    pub const fn found(record: Record) -> Self {
        Self { outcome: Ok(record) }
    }

    /// An accessor that yields `err` from [`Row::scan`].
    pub const fn failed(err: DbError) -> Self {
        Self { outcome: Err(err) }
    }

    /// Builds the accessor from a query outcome: the first row wins, an empty
    /// result becomes [`DbError::NoRows`], and a query error is kept as is.
    pub fn from_query(result: DbResult<ResultSet>) -> Self {
        let outcome = result.and_then(|set| {
            set.into_records()
                .into_iter()
                .next()
                .ok_or(DbError::NoRows)
        });
        Self { outcome }
    }

    /// Boxes the accessor as a trait object.
    pub fn boxed(self) -> Box<dyn Row> {
        Box::new(self)
    }
}

impl Row for RowResult {
    fn scan(self: Box<Self>) -> DbResult<Record> {
        self.outcome
    }
}

/// Drains a cursor, returning every remaining row of the current result set.
///
/// Returns the cursor's [`err`](Rows::err) if iteration ended early.
pub fn collect_records(rows: &mut dyn Rows) -> DbResult<Vec<Record>> {
    let mut out = Vec::new();
    while rows.advance() {
        out.push(rows.scan()?);
    }
    match rows.err() {
        Some(err) => Err(err.clone()),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueKind};

    fn ints(name: &str, values: &[i64]) -> ResultSet {
        ResultSet::new(
            vec![ColumnInfo::new(name, "INTEGER", ValueKind::Int)],
            values
                .iter()
                .map(|v| Record::new(vec![name.to_string()], vec![Value::Int(*v)]))
                .collect(),
        )
    }

    #[test]
    fn test_scan_before_advance() {
        let rows = BufferedRows::new(ints("n", &[1]));
        assert_eq!(rows.scan(), Err(DbError::NoCurrentRow));
    }

    #[test]
    fn test_iterates_in_order() {
        let mut rows = BufferedRows::new(ints("n", &[3, 1, 2]));
        let got: Vec<i64> = collect_records(&mut rows)
            .unwrap()
            .iter()
            .map(|r| r.get::<i64>("n").unwrap())
            .collect();
        assert_eq!(got, vec![3, 1, 2]);
        assert!(!rows.advance());
        assert_eq!(rows.scan(), Err(DbError::NoCurrentRow));
    }

    #[test]
    fn test_columns_and_types() {
        let rows = BufferedRows::new(ints("total", &[]));
        assert_eq!(rows.columns().unwrap(), vec!["total"]);
        let types = rows.column_types().unwrap();
        assert_eq!(types[0].database_type_name(), "INTEGER");
        assert_eq!(types[0].scan_type(), ValueKind::Int);
    }

    #[test]
    fn test_close() {
        let mut rows = BufferedRows::new(ints("n", &[1, 2]));
        assert!(rows.advance());
        rows.close().unwrap();
        rows.close().unwrap();
        assert!(!rows.advance());
        assert_eq!(rows.scan(), Err(DbError::RowsClosed));
        assert_eq!(rows.columns(), Err(DbError::RowsClosed));
    }

    #[test]
    fn test_multiple_result_sets() {
        let mut rows = BufferedRows::from_sets(vec![ints("a", &[1]), ints("b", &[2, 3])]);
        assert_eq!(collect_records(&mut rows).unwrap().len(), 1);
        assert!(rows.next_result_set());
        assert_eq!(rows.columns().unwrap(), vec!["b"]);
        assert_eq!(collect_records(&mut rows).unwrap().len(), 2);
        assert!(!rows.next_result_set());
    }

    #[test]
    fn test_from_sets_empty() {
        let mut rows = BufferedRows::from_sets(Vec::new());
        assert!(!rows.advance());
        assert!(rows.columns().unwrap().is_empty());
    }

    #[test]
    fn test_error_reported_after_rows() {
        let mut rows =
            BufferedRows::new(ints("n", &[1])).with_error(DbError::DatabaseError("io".into()));
        let err = collect_records(&mut rows).unwrap_err();
        assert_eq!(err, DbError::DatabaseError("io".into()));
    }

    #[test]
    fn test_row_result_first_row_wins() {
        let row = RowResult::from_query(Ok(ints("n", &[9, 8]))).boxed();
        assert_eq!(row.scan().unwrap().get::<i64>("n").unwrap(), 9);
    }

    #[test]
    fn test_row_result_no_rows() {
        let row = RowResult::from_query(Ok(ints("n", &[]))).boxed();
        assert_eq!(row.scan(), Err(DbError::NoRows));
    }

    #[test]
    fn test_row_result_keeps_query_error() {
        let err = DbError::DatabaseError("syntax error".into());
        let row = RowResult::from_query(Err(err.clone())).boxed();
        assert_eq!(row.scan(), Err(err));
    }
}
