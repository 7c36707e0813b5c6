//! DDL generation and on-disk shape inspection.
//!
//! Every constraint the catalog declares is also written into the generated
//! `CREATE TABLE`: `NOT NULL`, defaults, the primary key, unique sets,
//! foreign keys and value checks. Writes that bypass the enforcer are still
//! guarded by SQLite itself. Link rules have no SQL counterpart and are
//! enforced only by the [`Enforcer`](crate::Enforcer).
//!
//! Names come from validated catalog identifiers, so they are interpolated
//! directly.

use std::collections::BTreeMap;

use rusqlite::Connection;
use scenario_db_core::{Catalog, Check, ColumnDef, TableDef, Value};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Renders a value as an SQL literal.
pub(crate) fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        // `{:?}` keeps the decimal point, so `1.0` stays a REAL literal.
        Value::Real(r) => format!("{r:?}"),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn column_sql(table: &TableDef, column: &ColumnDef) -> String {
    let mut sql = format!("{} {}", column.name, column.ty.sql_name());
    if !table.is_nullable(column) {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&literal(default));
    }
    sql
}

/// `CHECK (...)` clause for one value check. `NULL` passes, as in SQL.
pub(crate) fn check_sql(check: &Check) -> String {
    let expr = match check {
        Check::Between { column, low, high } => {
            format!("{column} >= {low:?} AND {column} <= {high:?}")
        }
        Check::GreaterThan { column, bound } => format!("{column} > {bound:?}"),
        Check::AtLeast { column, bound } => format!("{column} >= {bound:?}"),
        Check::OneOf { column, allowed } => {
            let allowed = allowed.iter().map(literal).collect::<Vec<_>>();
            format!("{column} IN ({})", allowed.join(", "))
        }
    };
    format!("CHECK ({expr})")
}

/// `CREATE TABLE` for `table`, under its own name.
pub fn create_table_sql(table: &TableDef) -> String {
    create_table_sql_as(table, &table.name)
}

/// `CREATE TABLE` for `table`'s shape under another name, used for rebuild
/// shadows.
pub(crate) fn create_table_sql_as(table: &TableDef, name: &str) -> String {
    let mut clauses: Vec<String> = table
        .columns
        .iter()
        .map(|column| column_sql(table, column))
        .collect();

    if !table.primary_key.is_empty() {
        clauses.push(format!("PRIMARY KEY ({})", table.primary_key.join(", ")));
    }
    for unique in &table.unique {
        clauses.push(format!("UNIQUE ({})", unique.join(", ")));
    }
    for fk in &table.foreign_keys {
        clauses.push(format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            fk.columns.join(", "),
            fk.ref_table,
            fk.ref_columns.join(", ")
        ));
    }
    for check in &table.checks {
        clauses.push(check_sql(check));
    }

    format!("CREATE TABLE {name} (\n    {}\n);", clauses.join(",\n    "))
}

/// `ALTER TABLE ... ADD COLUMN` with inline checks.
///
/// SQLite requires a non-null default when adding a `NOT NULL` column.
pub(crate) fn add_column_sql(table: &TableDef, column: &ColumnDef, checks: &[Check]) -> String {
    let mut sql = format!("ALTER TABLE {} ADD COLUMN {}", table.name, column_sql(table, column));
    for check in checks {
        sql.push(' ');
        sql.push_str(&check_sql(check));
    }
    sql.push(';');
    sql
}

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShape {
    pub ty: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Column shapes of an on-disk table, keyed by column name.
pub type TableShape = BTreeMap<String, ColumnShape>;

/// Names of every user table, excluding SQLite's internal ones.
pub fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Reads the shape of `name`, or `None` if the table does not exist.
pub fn inspect_table(conn: &Connection, name: &str) -> Result<Option<TableShape>> {
    if !table_exists(conn, name)? {
        return Ok(None);
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({name})"))?;
    let columns = stmt.query_map([], |row| {
        let column: String = row.get("name")?;
        let ty: String = row.get("type")?;
        let not_null: i64 = row.get("notnull")?;
        let pk: i64 = row.get("pk")?;
        Ok((
            column,
            ColumnShape {
                ty: ty.to_uppercase(),
                not_null: not_null != 0,
                primary_key: pk > 0,
            },
        ))
    })?;

    let mut shape = TableShape::new();
    for column in columns {
        let (name, column) = column?;
        shape.insert(name, column);
    }
    Ok(Some(shape))
}

/// The shape a table definition produces on disk.
pub fn expected_shape(table: &TableDef) -> TableShape {
    table
        .columns
        .iter()
        .map(|column| {
            (
                column.name.clone(),
                ColumnShape {
                    ty: column.ty.sql_name().to_string(),
                    not_null: !table.is_nullable(column),
                    primary_key: table.is_key_column(&column.name),
                },
            )
        })
        .collect()
}

fn mismatch(table: &str, detail: impl Into<String>) -> StoreError {
    StoreError::SchemaMismatch {
        table: table.to_string(),
        detail: detail.into(),
    }
}

fn compare_shape(table: &TableDef, actual: &TableShape) -> Result<()> {
    let expected = expected_shape(table);

    if let Some(extra) = actual.keys().find(|c| !expected.contains_key(*c)) {
        return Err(mismatch(&table.name, format!("unexpected column {extra}")));
    }

    for (column, want) in &expected {
        let Some(have) = actual.get(column) else {
            return Err(mismatch(&table.name, format!("missing column {column}")));
        };
        if have.ty != want.ty {
            return Err(mismatch(
                &table.name,
                format!("column {column} has type {}, expected {}", have.ty, want.ty),
            ));
        }
        if have.not_null != want.not_null {
            let expected = if want.not_null { "NOT NULL" } else { "nullable" };
            return Err(mismatch(
                &table.name,
                format!("column {column} should be {expected}"),
            ));
        }
        if have.primary_key != want.primary_key {
            return Err(mismatch(
                &table.name,
                format!("primary key membership of column {column} differs"),
            ));
        }
    }

    Ok(())
}

/// Verifies every catalog table exists on disk with the declared shape.
/// Tables the catalog does not know are ignored.
///
/// # Errors
///
/// Returns [`StoreError::SchemaMismatch`] naming the first differing table.
pub fn verify_shape(conn: &Connection, catalog: &Catalog) -> Result<()> {
    for table in catalog.tables() {
        let Some(actual) = inspect_table(conn, &table.name)? else {
            return Err(mismatch(&table.name, "table is missing"));
        };
        compare_shape(table, &actual)?;
    }
    debug!(tables = catalog.tables().len(), "Verified on-disk shape");
    Ok(())
}
