//! Table definitions as data.
//!
//! A [`TableDef`] carries everything the enforcer and the DDL generator need:
//! typed columns, the primary key, unique sets, foreign-key edges, value
//! checks and link rules. Nothing here touches a database.
//!
//! # Example
//!
//! ```
//! use scenario_db_core::{Check, ColumnDef, TableDef, TableRole};
//!
//! let table = TableDef::new("TimeSegmentFraction", TableRole::Input)
//!     .column(ColumnDef::text("season"))
//!     .column(ColumnDef::text("tod"))
//!     .column(ColumnDef::real("segfrac"))
//!     .column(ColumnDef::text("notes").optional())
//!     .primary_key(["season", "tod"])
//!     .references(["season"], "TimeSeason", ["season"])
//!     .references(["tod"], "TimeOfDay", ["tod"])
//!     .check(Check::between("segfrac", 0.0, 1.0));
//!
//! assert!(table.validate().is_ok());
//! assert!(table.is_key_column("tod"));
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::value::Value;

/// Validates that a name is a plain SQL identifier.
///
/// Names are interpolated into generated SQL, so only ASCII alphanumerics
/// and underscores are allowed, and the first character may not be a digit.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(CatalogError::InvalidIdentifier(name.to_string()));
    };
    if first.is_ascii_digit() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CatalogError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// SQL type keyword used in generated DDL.
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Whether a non-null value may be stored in a column of this type.
    ///
    /// `REAL` columns accept integers; `INTEGER` columns reject reals.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Integer, Value::Integer(_)) => true,
            (ColumnType::Real, Value::Integer(_) | Value::Real(_)) => true,
            (ColumnType::Text, Value::Text(_)) => true,
            _ => false,
        }
    }
}

/// A single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl ColumnDef {
    /// A `NOT NULL` column with no default.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
        }
    }

    /// A required `INTEGER` column.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    /// A required `REAL` column.
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Real)
    }

    /// A required `TEXT` column.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    /// Allows `NULL`.
    pub fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the value stored when a row omits this column.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A foreign-key edge from `columns` to `ref_columns` of `ref_table`.
///
/// Composite keys are matched positionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// A value predicate over one column. `NULL` always satisfies a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Check {
    /// `low <= x <= high`.
    Between { column: String, low: f64, high: f64 },
    /// `x > bound`.
    GreaterThan { column: String, bound: f64 },
    /// `x >= bound`.
    AtLeast { column: String, bound: f64 },
    /// `x IN (allowed...)`.
    OneOf { column: String, allowed: Vec<Value> },
}

impl Check {
    /// Inclusive `[low, high]` range.
    pub fn between(column: impl Into<String>, low: f64, high: f64) -> Self {
        Check::Between {
            column: column.into(),
            low,
            high,
        }
    }

    /// Inclusive `[0, 1]`, used for every proportion and factor column.
    pub fn fraction(column: impl Into<String>) -> Self {
        Self::between(column, 0.0, 1.0)
    }

    /// Strict lower bound.
    pub fn greater_than(column: impl Into<String>, bound: f64) -> Self {
        Check::GreaterThan {
            column: column.into(),
            bound,
        }
    }

    /// Inclusive lower bound.
    pub fn at_least(column: impl Into<String>, bound: f64) -> Self {
        Check::AtLeast {
            column: column.into(),
            bound,
        }
    }

    /// Restricts an integer column to `0` or `1`.
    pub fn flag(column: impl Into<String>) -> Self {
        Check::OneOf {
            column: column.into(),
            allowed: vec![Value::Integer(0), Value::Integer(1)],
        }
    }

    /// The column this check constrains.
    pub fn column(&self) -> &str {
        match self {
            Check::Between { column, .. }
            | Check::GreaterThan { column, .. }
            | Check::AtLeast { column, .. }
            | Check::OneOf { column, .. } => column,
        }
    }

    /// Evaluates the predicate. Non-numeric values fail numeric checks.
    pub fn holds(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Check::Between { low, high, .. } => {
                value.as_f64().is_some_and(|x| *low <= x && x <= *high)
            }
            Check::GreaterThan { bound, .. } => value.as_f64().is_some_and(|x| x > *bound),
            Check::AtLeast { bound, .. } => value.as_f64().is_some_and(|x| x >= *bound),
            Check::OneOf { allowed, .. } => allowed.iter().any(|a| a.loosely_equals(value)),
        }
    }
}

/// A cross-reference rule: every listed column must independently name an
/// existing `table.key`.
///
/// Used where one row points at two members of the same key family (a driver
/// and a driven technology) and both must exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRule {
    pub name: String,
    pub columns: Vec<String>,
    pub table: String,
    pub key: String,
}

/// What kind of data a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableRole {
    /// Fixed label tables seeded by the schema itself.
    Lookup,
    /// Version marker and global scalars.
    Metadata,
    /// Scenario inputs authored outside the store.
    Input,
    /// Solver results partitioned by `scenario`.
    Output,
}

/// Declarative definition of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub role: TableRole,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub unique: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
    pub checks: Vec<Check>,
    pub links: Vec<LinkRule>,
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl TableDef {
    /// An empty table definition.
    pub fn new(name: impl Into<String>, role: TableRole) -> Self {
        Self {
            name: name.into(),
            role,
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns, in key order.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = strings(columns);
        self
    }

    /// Adds a unique column set.
    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(strings(columns));
        self
    }

    /// Adds a foreign key from `columns` to `ref_table(ref_columns)`.
    pub fn references<I, S, J, T>(mut self, columns: I, ref_table: impl Into<String>, ref_columns: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.foreign_keys.push(ForeignKey {
            columns: strings(columns),
            ref_table: ref_table.into(),
            ref_columns: strings(ref_columns),
        });
        self
    }

    /// Adds a value check.
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Adds a link rule: each of `columns` must name a row of `table` by `key`.
    pub fn link<I, S>(mut self, name: impl Into<String>, columns: I, table: impl Into<String>, key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links.push(LinkRule {
            name: name.into(),
            columns: strings(columns),
            table: table.into(),
            key: key.into(),
        });
        self
    }

    /// Looks up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether `name` is a declared column.
    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Whether `name` is part of the primary key.
    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// Whether `NULL` may be stored in `column`. Key columns never are.
    pub fn is_nullable(&self, column: &ColumnDef) -> bool {
        column.nullable && !self.is_key_column(&column.name)
    }

    /// Checks that every name is an identifier and that keys, checks and
    /// links only mention declared columns.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;

        let mut seen = HashSet::new();
        for column in &self.columns {
            validate_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(CatalogError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        let referenced = self
            .primary_key
            .iter()
            .chain(self.unique.iter().flatten())
            .chain(self.foreign_keys.iter().flat_map(|fk| fk.columns.iter()))
            .chain(self.links.iter().flat_map(|l| l.columns.iter()))
            .map(String::as_str)
            .chain(self.checks.iter().map(Check::column));

        for column in referenced {
            if !self.has_column(column) {
                return Err(CatalogError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.to_string(),
                });
            }
        }

        for fk in &self.foreign_keys {
            validate_identifier(&fk.ref_table)?;
            for column in &fk.ref_columns {
                validate_identifier(column)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("Output_Costs_2").is_ok());
        assert!(validate_identifier("segfrac").is_ok());
        assert!(validate_identifier("_shadow").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("drop;--").is_err());
        assert!(validate_identifier("tech name").is_err());
    }

    #[test]
    fn test_real_column_accepts_integer() {
        assert!(ColumnType::Real.accepts(&Value::Integer(1)));
        assert!(!ColumnType::Integer.accepts(&Value::Real(1.5)));
        assert!(!ColumnType::Text.accepts(&Value::Integer(7)));
        assert!(ColumnType::Text.accepts(&Value::Null));
    }

    #[test]
    fn test_fraction_boundaries_are_inclusive() {
        let check = Check::fraction("factor");
        assert!(check.holds(&Value::Real(0.0)));
        assert!(check.holds(&Value::Real(1.0)));
        assert!(check.holds(&Value::Integer(1)));
        assert!(!check.holds(&Value::Real(1.0001)));
        assert!(!check.holds(&Value::Real(-0.01)));
    }

    #[test]
    fn test_greater_than_is_strict() {
        let check = Check::greater_than("efficiency", 0.0);
        assert!(!check.holds(&Value::Real(0.0)));
        assert!(check.holds(&Value::Real(1e-9)));
    }

    #[test]
    fn test_checks_pass_null_and_reject_text() {
        let check = Check::flag("annual");
        assert!(check.holds(&Value::Null));
        assert!(check.holds(&Value::Integer(0)));
        assert!(!check.holds(&Value::Integer(2)));
        assert!(!Check::at_least("lifetime", 0.0).holds(&Value::from("ten")));
    }

    #[test]
    fn test_validate_rejects_unknown_key_column() {
        let table = TableDef::new("Region", TableRole::Input)
            .column(ColumnDef::text("region"))
            .primary_key(["name"]);
        assert_eq!(
            table.validate(),
            Err(CatalogError::UnknownColumn {
                table: "Region".into(),
                column: "name".into()
            })
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_column() {
        let table = TableDef::new("Region", TableRole::Input)
            .column(ColumnDef::text("region"))
            .column(ColumnDef::text("region"));
        assert!(matches!(
            table.validate(),
            Err(CatalogError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_key_columns_are_never_nullable() {
        let table = TableDef::new("Region", TableRole::Input)
            .column(ColumnDef::text("region").optional())
            .primary_key(["region"]);
        assert!(!table.is_nullable(&table.columns[0]));
    }
}
