//! Constraint Enforcer.
//!
//! Interprets a [`Catalog`] against a live connection. A row is checked in a
//! fixed order and the first failure is reported:
//!
//! 1. unknown columns, storage types, nullability
//! 2. primary key and unique sets
//! 3. foreign keys (skipped when any of the row's key columns is `NULL`)
//! 4. value checks
//! 5. link rules
//!
//! The enforcer only reads. Foreign-key checking can be switched off only by
//! the migration runner, which re-validates the whole store before commit.
//!
//! # Example
//!
//! ```
//! use rusqlite::Connection;
//! use scenario_db_core::{Registry, Row, ViolationKind};
//! use scenario_db_sqlite::{Enforcer, Migrator};
//!
//! let conn = Connection::open_in_memory().unwrap();
//! Migrator::new(&conn).upgrade().unwrap();
//! let catalog = Registry::standard().current_schema().unwrap();
//!
//! let row = Row::new().with("tech", "PLANT").with("flag", "nope");
//! let err = Enforcer::new(&catalog).validate(&conn, "Technology", &row).unwrap_err();
//! assert_eq!(err.violation().unwrap().kind, ViolationKind::ForeignKey);
//! ```

use rusqlite::Connection;
use scenario_db_core::{
    Catalog, ConstraintViolation, Row, TableDef, ViolationKind, validate_checks, validate_columns, with_defaults,
};
use tracing::debug;

use crate::convert::{project, row_exists, select_rows};
use crate::error::{Result, StoreError};

/// Validates rows against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Enforcer<'a> {
    catalog: &'a Catalog,
    foreign_keys: bool,
}

impl<'a> Enforcer<'a> {
    /// An enforcer that checks every constraint.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            foreign_keys: true,
        }
    }

    /// An enforcer that skips foreign keys. Only the migration runner holds
    /// one, while tables are being reshaped.
    pub(crate) fn without_foreign_keys(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            foreign_keys: false,
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Checks that `row` may be inserted into `table`. Column defaults are
    /// applied before checking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConstraintError`] with the first violation, or
    /// [`StoreError::CatalogError`] if `table` is unknown.
    pub fn validate(&self, conn: &Connection, table: &str, row: &Row) -> Result<()> {
        let def = self.catalog.table(table)?;
        let row = with_defaults(def, row);

        validate_columns(def, &row)?;
        self.check_keys(conn, def, &row)?;
        if self.foreign_keys {
            self.check_foreign_keys(conn, def, &row)?;
        }
        validate_checks(def, &row)?;
        self.check_links(conn, def, &row)?;
        Ok(())
    }

    fn check_keys(&self, conn: &Connection, def: &TableDef, row: &Row) -> Result<()> {
        let key_sets = std::iter::once((ViolationKind::PrimaryKey, &def.primary_key))
            .chain(def.unique.iter().map(|u| (ViolationKind::Unique, u)));

        for (kind, columns) in key_sets {
            if columns.is_empty() {
                continue;
            }
            let values = project(row, columns);
            // SQL unique sets admit any number of rows with a NULL member.
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            if row_exists(conn, &def.name, columns, &values)? {
                return Err(ConstraintViolation::for_key(kind, &def.name, columns, &values).into());
            }
        }
        Ok(())
    }

    fn check_foreign_keys(&self, conn: &Connection, def: &TableDef, row: &Row) -> Result<()> {
        for fk in &def.foreign_keys {
            let values = project(row, &fk.columns);
            if values.iter().any(|v| v.is_null()) {
                continue;
            }
            if !row_exists(conn, &fk.ref_table, &fk.ref_columns, &values)? {
                return Err(ConstraintViolation::for_key(
                    ViolationKind::ForeignKey,
                    &def.name,
                    &fk.columns,
                    &values,
                )
                .into());
            }
        }
        Ok(())
    }

    fn check_links(&self, conn: &Connection, def: &TableDef, row: &Row) -> Result<()> {
        for link in &def.links {
            let key = [link.key.clone()];
            for column in &link.columns {
                let value = row.value(column);
                if value.is_null() {
                    continue;
                }
                if !row_exists(conn, &link.table, &key, std::slice::from_ref(value))? {
                    return Err(ConstraintViolation::new(
                        ViolationKind::Link,
                        &def.name,
                        column,
                        format!("{value} (rule {})", link.name),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Re-validates every stored row: types, nullability, foreign keys,
    /// checks and link rules, then SQLite's own `foreign_key_check`.
    ///
    /// Key uniqueness is left to the declared SQL keys.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, table by table in catalog order.
    pub fn revalidate(&self, conn: &Connection) -> Result<()> {
        let mut scanned = 0usize;
        for def in self.catalog.tables() {
            for row in select_rows(conn, def)? {
                validate_columns(def, &row)?;
                if self.foreign_keys {
                    self.check_foreign_keys(conn, def, &row)?;
                }
                validate_checks(def, &row)?;
                self.check_links(conn, def, &row)?;
                scanned += 1;
            }
        }

        if self.foreign_keys {
            foreign_key_check(conn)?;
        }
        debug!(tables = self.catalog.tables().len(), rows = scanned, "Revalidated store");
        Ok(())
    }
}

/// Runs `PRAGMA foreign_key_check` and reports the first dangling row.
fn foreign_key_check(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let mut rows = stmt.query([])?;
    if let Some(row) = rows.next()? {
        let table: String = row.get(0)?;
        let rowid: Option<i64> = row.get(1)?;
        let parent: String = row.get(2)?;
        return Err(StoreError::ConstraintError(ConstraintViolation::new(
            ViolationKind::ForeignKey,
            table,
            format!("-> {parent}"),
            rowid.map_or_else(|| "row".to_string(), |id| format!("rowid {id}")),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_table_sql;
    use scenario_db_core::{Check, ColumnDef, TableRole};

    fn catalog() -> Catalog {
        let tables = [
            TableDef::new("Technology", TableRole::Input)
                .column(ColumnDef::text("tech"))
                .primary_key(["tech"]),
            TableDef::new("LinkedTech", TableRole::Input)
                .column(ColumnDef::text("primary_tech"))
                .column(ColumnDef::text("driven_tech"))
                .column(ColumnDef::real("share").optional())
                .primary_key(["primary_tech"])
                .references(["primary_tech"], "Technology", ["tech"])
                .check(Check::fraction("share"))
                .link("linked", ["primary_tech", "driven_tech"], "Technology", "tech"),
        ];
        let mut catalog = Catalog::empty();
        for table in tables {
            catalog
                .apply(&scenario_db_core::Action::CreateTable(table))
                .unwrap();
        }
        catalog
    }

    fn setup(catalog: &Catalog) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        for table in catalog.tables() {
            conn.execute_batch(&create_table_sql(table)).unwrap();
        }
        conn.execute("INSERT INTO Technology (tech) VALUES ('A')", []).unwrap();
        conn
    }

    fn kind(err: StoreError) -> ViolationKind {
        err.violation().unwrap().kind
    }

    #[test]
    fn test_duplicate_primary_key() {
        let catalog = catalog();
        let conn = setup(&catalog);
        let err = Enforcer::new(&catalog)
            .validate(&conn, "Technology", &Row::new().with("tech", "A"))
            .unwrap_err();
        assert_eq!(kind(err), ViolationKind::PrimaryKey);
    }

    #[test]
    fn test_foreign_key_before_check() {
        let catalog = catalog();
        let conn = setup(&catalog);
        let row = Row::new()
            .with("primary_tech", "MISSING")
            .with("driven_tech", "A")
            .with("share", 2.0);
        let err = Enforcer::new(&catalog).validate(&conn, "LinkedTech", &row).unwrap_err();
        assert_eq!(kind(err), ViolationKind::ForeignKey);
    }

    #[test]
    fn test_link_rule_checked_last() {
        let catalog = catalog();
        let conn = setup(&catalog);
        let row = Row::new().with("primary_tech", "A").with("driven_tech", "GHOST");
        let err = Enforcer::new(&catalog).validate(&conn, "LinkedTech", &row).unwrap_err();
        let violation = err.violation().unwrap();
        assert_eq!(violation.kind, ViolationKind::Link);
        assert_eq!(violation.column, "driven_tech");
    }

    #[test]
    fn test_suspended_foreign_keys() {
        let catalog = catalog();
        let conn = setup(&catalog);
        let row = Row::new().with("primary_tech", "LATER").with("driven_tech", "A");
        let err = Enforcer::without_foreign_keys(&catalog)
            .validate(&conn, "LinkedTech", &row)
            .unwrap_err();
        // The link rule still sees the missing technology.
        assert_eq!(kind(err), ViolationKind::Link);
    }

    #[test]
    fn test_revalidate_finds_raw_violation() {
        let catalog = catalog();
        let conn = setup(&catalog);
        conn.execute_batch("PRAGMA foreign_keys = OFF;").unwrap();
        conn.execute(
            "INSERT INTO LinkedTech (primary_tech, driven_tech) VALUES ('A', 'GHOST')",
            [],
        )
        .unwrap();
        let enforcer = Enforcer::new(&catalog);
        assert_eq!(kind(enforcer.revalidate(&conn).unwrap_err()), ViolationKind::Link);
    }

    #[test]
    fn test_revalidate_clean_store() {
        let catalog = catalog();
        let conn = setup(&catalog);
        conn.execute(
            "INSERT INTO LinkedTech (primary_tech, driven_tech, share) VALUES ('A', 'A', 0.5)",
            [],
        )
        .unwrap();
        assert!(Enforcer::new(&catalog).revalidate(&conn).is_ok());
    }
}
