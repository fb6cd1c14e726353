//! Column metadata.
//!
//! [`ColumnType`] is the capability trait cursors hand out for each result
//! column. [`ColumnInfo`] is the plain implementation every backend in this
//! workspace uses.

use std::fmt;

use crate::value::ValueKind;

/// Metadata about one result column.
///
/// Methods returning `Option` yield `None` when the driver does not know the
/// answer, which is different from a definite "no".
pub trait ColumnType: Send + Sync + fmt::Debug {
    /// The column name (or alias) as reported by the database.
    fn name(&self) -> &str;

    /// The database-specific type name in upper case (e.g. `INTEGER`,
    /// `VARCHAR`, `TIMESTAMPTZ`). Empty if the type is not declared.
    fn database_type_name(&self) -> &str;

    /// Precision and scale for decimal columns.
    fn decimal_size(&self) -> Option<(i64, i64)>;

    /// Length for variable-length text and binary columns.
    fn length(&self) -> Option<i64>;

    /// Whether the column may contain NULL.
    fn nullable(&self) -> Option<bool>;

    /// The [`ValueKind`] values from this column decode to.
    fn scan_type(&self) -> ValueKind;
}

/// Column metadata as reported by a driver.
///
/// # Examples
///
/// ```
/// use isql_db::{ColumnInfo, ColumnType, ValueKind};
///
/// let col = ColumnInfo::new("price", "NUMERIC", ValueKind::Float)
///     .with_decimal_size(10, 2)
///     .with_nullable(false);
/// assert_eq!(col.decimal_size(), Some((10, 2)));
/// assert_eq!(col.length(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    name: String,
    database_type_name: String,
    decimal_size: Option<(i64, i64)>,
    length: Option<i64>,
    nullable: Option<bool>,
    scan_type: ValueKind,
}

impl ColumnInfo {
    /// Creates metadata with only the name, type name, and scan type known.
    pub fn new(
        name: impl Into<String>,
        database_type_name: impl Into<String>,
        scan_type: ValueKind,
    ) -> Self {
        Self {
            name: name.into(),
            database_type_name: database_type_name.into().to_uppercase(),
            decimal_size: None,
            length: None,
            nullable: None,
            scan_type,
        }
    }

    /// Sets precision and scale.
    #[must_use]
    pub const fn with_decimal_size(mut self, precision: i64, scale: i64) -> Self {
        self.decimal_size = Some((precision, scale));
        self
    }

    /// Sets the declared length.
    #[must_use]
    pub const fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets nullability.
    #[must_use]
    pub const fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

impl ColumnType for ColumnInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn database_type_name(&self) -> &str {
        &self.database_type_name
    }

    fn decimal_size(&self) -> Option<(i64, i64)> {
        self.decimal_size
    }

    fn length(&self) -> Option<i64> {
        self.length
    }

    fn nullable(&self) -> Option<bool> {
        self.nullable
    }

    fn scan_type(&self) -> ValueKind {
        self.scan_type
    }
}
