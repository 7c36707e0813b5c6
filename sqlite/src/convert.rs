//! Conversion between catalog [`Row`]s and SQLite rows.
//!
//! [`Value`] lives in the core crate, so it is mapped onto
//! [`rusqlite::types::Value`] here rather than implementing `ToSql` for it.
//! Every statement is generated from a [`TableDef`], binding values as
//! parameters and interpolating only validated identifiers.

use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use scenario_db_core::{Row, TableDef, Value};

use crate::error::Result;

pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

/// Blobs never appear in a catalog table; one found on disk is read as
/// lossy text so the enforcer reports it as a type violation.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// `WHERE a = ?1 AND b = ?2 ...` over `columns`.
fn where_equal(columns: &[String]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Whether `table` has a row whose `columns` equal `values`.
pub(crate) fn row_exists(conn: &Connection, table: &str, columns: &[String], values: &[Value]) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE {} LIMIT 1", where_equal(columns));
    let mut stmt = conn.prepare_cached(&sql)?;
    let params = values.iter().map(to_sql).collect::<Vec<_>>();
    let found = stmt.exists(rusqlite::params_from_iter(params))?;
    Ok(found)
}

/// Values of `columns` in `row`, in order.
pub(crate) fn project(row: &Row, columns: &[String]) -> Vec<Value> {
    columns.iter().map(|c| row.value(c).clone()).collect()
}

/// Inserts `row`, writing every declared column. Absent columns are `NULL`.
pub(crate) fn insert_row(conn: &Connection, table: &TableDef, row: &Row) -> Result<()> {
    let columns = table.column_names().collect::<Vec<_>>();
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let params = columns.iter().map(|c| to_sql(row.value(c))).collect::<Vec<_>>();
    stmt.execute(rusqlite::params_from_iter(params))?;
    Ok(())
}

/// Every row of `table`, ordered by primary key (insertion order for tables
/// without one).
pub(crate) fn select_rows(conn: &Connection, table: &TableDef) -> Result<Vec<Row>> {
    let columns = table.column_names().collect::<Vec<_>>();
    let order = if table.primary_key.is_empty() {
        "rowid".to_string()
    } else {
        table.primary_key.join(", ")
    };
    let sql = format!("SELECT {} FROM {} ORDER BY {order}", columns.join(", "), table.name);

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(sql_row) = rows.next()? {
        let mut row = Row::new();
        for (i, column) in columns.iter().enumerate() {
            row.set(*column, from_sql(sql_row.get_ref(i)?));
        }
        out.push(row);
    }
    Ok(out)
}

/// Deletes rows where `column = value`, returning the count.
pub(crate) fn delete_where(conn: &Connection, table: &str, column: &str, value: &Value) -> Result<usize> {
    let sql = format!("DELETE FROM {table} WHERE {column} = ?1");
    let deleted = conn.execute(&sql, [to_sql(value)])?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_table_sql;
    use scenario_db_core::{ColumnDef, TableRole};

    fn region() -> TableDef {
        TableDef::new("Region", TableRole::Input)
            .column(ColumnDef::text("region"))
            .column(ColumnDef::text("notes").optional())
            .primary_key(["region"])
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&create_table_sql(&region())).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_select_in_key_order() {
        let conn = setup();
        let table = region();
        insert_row(&conn, &table, &Row::new().with("region", "zeta")).unwrap();
        insert_row(&conn, &table, &Row::new().with("region", "alpha").with("notes", "first")).unwrap();

        let rows = select_rows(&conn, &table).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("region"), &Value::from("alpha"));
        assert_eq!(rows[1].value("notes"), &Value::Null);
    }

    #[test]
    fn test_row_exists() {
        let conn = setup();
        insert_row(&conn, &region(), &Row::new().with("region", "linkville")).unwrap();
        let key = vec!["region".to_string()];
        assert!(row_exists(&conn, "Region", &key, &[Value::from("linkville")]).unwrap());
        assert!(!row_exists(&conn, "Region", &key, &[Value::from("nowhere")]).unwrap());
    }

    #[test]
    fn test_delete_where_counts() {
        let conn = setup();
        insert_row(&conn, &region(), &Row::new().with("region", "a")).unwrap();
        insert_row(&conn, &region(), &Row::new().with("region", "b")).unwrap();
        assert_eq!(delete_where(&conn, "Region", "region", &Value::from("a")).unwrap(), 1);
        assert_eq!(delete_where(&conn, "Region", "region", &Value::from("a")).unwrap(), 0);
    }

    #[test]
    fn test_value_mapping() {
        assert_eq!(to_sql(&Value::Real(0.5)), SqlValue::Real(0.5));
        assert_eq!(from_sql(ValueRef::Integer(7)), Value::Integer(7));
        assert_eq!(from_sql(ValueRef::Text(b"CO2")), Value::from("CO2"));
    }
}
