//! Row-local validation.
//!
//! Everything the enforcer can decide from a row and its [`TableDef`] alone:
//! unknown columns, storage types, nullability and value checks. Checks that
//! need the database (keys, foreign keys, link rules) live in the SQLite
//! crate and produce the same [`ConstraintViolation`].
//!
//! # Examples
//!
//! ```
//! use scenario_db_core::*;
//!
//! let table = TableDef::new("TimeSegmentFraction", TableRole::Input)
//!     .column(ColumnDef::text("season"))
//!     .column(ColumnDef::text("tod"))
//!     .column(ColumnDef::real("segfrac"))
//!     .primary_key(["season", "tod"])
//!     .check(Check::fraction("segfrac"));
//!
//! let ok = Row::new().with("season", "winter").with("tod", "day").with("segfrac", 1.0);
//! assert!(validate_row(&table, &ok).is_ok());
//!
//! let bad = ok.clone().with("segfrac", 1.5);
//! let violation = validate_row(&table, &bad).unwrap_err();
//! assert_eq!(violation.kind, ViolationKind::Check);
//! ```

use std::fmt;

use thiserror::Error;

use crate::table::TableDef;
use crate::value::{Row, Value};

/// Which rule a row broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Value storage class does not match the declared column type.
    Type,
    /// `NULL` in a column that does not allow it.
    NotNull,
    /// Row names a column the table does not declare.
    UnknownColumn,
    /// Primary key already present.
    PrimaryKey,
    /// Unique set already present.
    Unique,
    /// Foreign key names a row that does not exist.
    ForeignKey,
    /// Value check failed.
    Check,
    /// A link rule column names a row that does not exist.
    Link,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::Type => "type",
            ViolationKind::NotNull => "not-null",
            ViolationKind::UnknownColumn => "unknown column",
            ViolationKind::PrimaryKey => "primary key",
            ViolationKind::Unique => "unique",
            ViolationKind::ForeignKey => "foreign key",
            ViolationKind::Check => "check",
            ViolationKind::Link => "link",
        };
        f.write_str(name)
    }
}

/// A rejected row.
///
/// `column` names the offending column, or the comma-joined columns of a
/// composite key. `value` is the offending value rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} violation in {table}({column}): {value}")]
pub struct ConstraintViolation {
    pub kind: ViolationKind,
    pub table: String,
    pub column: String,
    pub value: String,
}

impl ConstraintViolation {
    pub fn new(
        kind: ViolationKind,
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    /// A violation over a composite key, rendering the key tuple.
    pub fn for_key(kind: ViolationKind, table: &str, columns: &[String], values: &[Value]) -> Self {
        let rendered = values.iter().map(Value::to_string).collect::<Vec<_>>();
        Self::new(
            kind,
            table,
            columns.join(", "),
            format!("({})", rendered.join(", ")),
        )
    }
}

/// Returns `row` with declared defaults filled in for absent columns.
pub fn with_defaults(table: &TableDef, row: &Row) -> Row {
    let mut complete = row.clone();
    for column in &table.columns {
        if complete.contains(&column.name) {
            continue;
        }
        if let Some(default) = &column.default {
            complete.set(column.name.clone(), default.clone());
        }
    }
    complete
}

/// Checks unknown columns, types, nullability and value checks, in that
/// order. Defaults must already be applied (see [`with_defaults`]).
///
/// # Errors
///
/// Returns the first [`ConstraintViolation`] found.
pub fn validate_row(table: &TableDef, row: &Row) -> Result<(), ConstraintViolation> {
    validate_columns(table, row)?;
    validate_checks(table, row)
}

/// Unknown columns, then storage types and nullability.
pub fn validate_columns(table: &TableDef, row: &Row) -> Result<(), ConstraintViolation> {
    for (column, value) in row.iter() {
        if !table.has_column(column) {
            return Err(ConstraintViolation::new(
                ViolationKind::UnknownColumn,
                &table.name,
                column,
                value.to_string(),
            ));
        }
    }

    for column in &table.columns {
        let value = row.value(&column.name);
        if value.is_null() {
            if !table.is_nullable(column) {
                return Err(ConstraintViolation::new(
                    ViolationKind::NotNull,
                    &table.name,
                    &column.name,
                    "NULL",
                ));
            }
            continue;
        }
        if !column.ty.accepts(value) {
            return Err(ConstraintViolation::new(
                ViolationKind::Type,
                &table.name,
                &column.name,
                format!("{value} ({} in {} column)", value.type_name(), column.ty.sql_name()),
            ));
        }
    }

    Ok(())
}

/// Value checks. `NULL` passes every check.
pub fn validate_checks(table: &TableDef, row: &Row) -> Result<(), ConstraintViolation> {
    for check in &table.checks {
        let value = row.value(check.column());
        if !check.holds(value) {
            return Err(ConstraintViolation::new(
                ViolationKind::Check,
                &table.name,
                check.column(),
                value.to_string(),
            ));
        }
    }
    Ok(())
}
