//! Scenario store facade.
//!
//! [`Store`] owns a connection, upgrades it on open and guards every write
//! with the [`Enforcer`] built from the current catalog. Each mutating call
//! runs in one transaction that rolls back on error.
//!
//! # Example
//!
//! ```
//! use scenario_db_core::Row;
//! use scenario_db_sqlite::Store;
//!
//! let mut store = Store::open_in_memory().unwrap();
//! store.insert("Region", Row::new().with("region", "linkville")).unwrap();
//! store
//!     .insert_all(
//!         "TimePeriod",
//!         [
//!             Row::new().with("sequence", 1).with("period", 2020).with("flag", "f"),
//!             Row::new().with("sequence", 2).with("period", 2025).with("flag", "f"),
//!         ],
//!     )
//!     .unwrap();
//!
//! assert_eq!(store.rows("TimePeriod").unwrap().len(), 2);
//! assert_eq!(store.global_discount_rate().unwrap(), Some(0.05));
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use scenario_db_core::entities::{GLOBAL_DISCOUNT_RATE, MYOPIC_BASE_YEAR, SCENARIO_COLUMN};
use scenario_db_core::{
    Catalog, MAJOR_ELEMENT, MINOR_ELEMENT, Registry, Row, SchemaVersion, StoreConfig, TableRole, Value,
};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::convert::{delete_where, from_sql, insert_row, select_rows};
use crate::enforce::Enforcer;
use crate::error::{Result, StoreError};
use crate::migration::{Migrator, stored_version};
use crate::schema;

/// A scenario store at a known schema version.
pub struct Store {
    conn: Connection,
    registry: Registry,
    catalog: Catalog,
    version: Option<SchemaVersion>,
}

impl Store {
    /// Opens (creating if needed) and upgrades the store at `path`.
    ///
    /// # Errors
    ///
    /// Any error from [`Migrator::upgrade`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::open_with(conn, &StoreConfig::default())
    }

    /// A fresh, upgraded in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with(Connection::open_in_memory()?, &StoreConfig::default())
    }

    /// Opens `conn` without migrating it. Reads work at any known version;
    /// writes fail with [`StoreError::VersionBehind`] until the store is
    /// current.
    pub fn open_without_upgrade(conn: Connection) -> Result<Self> {
        let config = StoreConfig {
            upgrade_on_open: false,
            ..StoreConfig::default()
        };
        Self::open_with(conn, &config)
    }

    /// Opens `conn` according to `config`.
    pub fn open_with(conn: Connection, config: &StoreConfig) -> Result<Self> {
        Self::open_with_registry(conn, Registry::standard(), config)
    }

    /// Opens `conn` against a custom registry.
    pub fn open_with_registry(conn: Connection, registry: Registry, config: &StoreConfig) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version = {
            let migrator = Migrator::with_registry(&conn, registry.clone());
            if config.upgrade_on_open {
                Some(migrator.upgrade()?)
            } else {
                migrator.verify()?
            }
        };
        let catalog = match version {
            Some(v) => registry.schema(v)?,
            None => Catalog::empty(),
        };

        debug!(version = %scenario_db_core::display_version(&version), "Opened store");
        Ok(Self {
            conn,
            registry,
            catalog,
            version,
        })
    }

    /// Opens the store at `path` using the YAML configuration at
    /// `config_path`.
    pub fn open_configured(path: impl AsRef<Path>, config_path: impl AsRef<Path>) -> Result<Self> {
        let config = StoreConfig::load(config_path)?;
        Self::open_with(Connection::open(path)?, &config)
    }

    pub fn version(&self) -> Option<SchemaVersion> {
        self.version
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Upgrades a store opened without upgrade, reloading the catalog.
    pub fn upgrade(&mut self) -> Result<SchemaVersion> {
        let version = Migrator::with_registry(&self.conn, self.registry.clone()).upgrade()?;
        self.catalog = self.registry.schema(version)?;
        self.version = Some(version);
        Ok(version)
    }

    fn ensure_current(&self) -> Result<()> {
        let current = self.registry.latest().ok_or(StoreError::EmptyRegistry)?;
        if self.version != Some(current) {
            return Err(StoreError::VersionBehind {
                stored: self.version,
                current,
            });
        }
        Ok(())
    }

    /// Validates and inserts one row.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConstraintError`] if the enforcer rejects the row,
    /// [`StoreError::ReservedMetadata`] for version marker rows.
    pub fn insert(&mut self, table: &str, row: Row) -> Result<()> {
        self.insert_all(table, [row])
    }

    /// Validates and inserts `rows` in one transaction. Either every row is
    /// stored or none is.
    pub fn insert_all(&mut self, table: &str, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        self.ensure_current()?;
        let tx = self.conn.transaction()?;
        let mut count = 0usize;
        for row in rows {
            insert_checked(&tx, &self.catalog, table, &row)?;
            count += 1;
        }
        tx.commit()?;
        debug!(table = table, rows = count, "Inserted rows");
        Ok(())
    }

    /// Every row of `table`, ordered by primary key.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let def = self.catalog.table(table)?;
        select_rows(&self.conn, def)
    }

    fn output_tables(&self) -> impl Iterator<Item = &str> {
        self.catalog
            .tables_with_role(TableRole::Output)
            .map(|t| t.name.as_str())
    }

    fn output_table_names(&self) -> Vec<String> {
        self.output_tables().map(str::to_string).collect()
    }

    /// Replaces every output row of `scenario` with `outputs`.
    ///
    /// The scenario's rows and those of its iterative runs
    /// (`<scenario>-<suffix>`) are deleted from every output table first, so a
    /// table left out of `outputs` ends up empty for this scenario. The
    /// `scenario` column is filled in on each row.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotAnOutputTable`] if `outputs` names an input table,
    /// or the first constraint violation. Nothing is written on error.
    pub fn write_scenario<I, T>(&mut self, scenario: &str, outputs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (T, Row)>,
        T: AsRef<str>,
    {
        self.ensure_current()?;
        let tables = self.output_table_names();

        let tx = self.conn.transaction()?;
        let removed = delete_scenario(&tx, &tables, scenario)? + delete_iterative_runs(&tx, &tables, scenario)?;
        let written = insert_outputs(&tx, &self.catalog, &tables, scenario, outputs)?;
        tx.commit()?;

        debug!(scenario = scenario, removed = removed, written = written, "Wrote scenario outputs");
        Ok(written)
    }

    /// Adds `outputs` without clearing anything first.
    ///
    /// With an `iteration` the rows are stored under `<scenario>-<iteration>`,
    /// the naming [`clear_iterative_runs`](Self::clear_iterative_runs)
    /// removes. Rows colliding with stored ones fail with a primary key
    /// violation and nothing is written.
    pub fn append_scenario<I, T>(&mut self, scenario: &str, iteration: Option<u32>, outputs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (T, Row)>,
        T: AsRef<str>,
    {
        self.ensure_current()?;
        let tables = self.output_table_names();
        let name = match iteration {
            Some(i) => format!("{scenario}-{i}"),
            None => scenario.to_string(),
        };

        let tx = self.conn.transaction()?;
        let written = insert_outputs(&tx, &self.catalog, &tables, &name, outputs)?;
        tx.commit()?;

        debug!(scenario = %name, written = written, "Appended scenario outputs");
        Ok(written)
    }

    /// Deletes every output row of `scenario` and of its iterative runs,
    /// returning the count.
    pub fn clear_scenario(&mut self, scenario: &str) -> Result<usize> {
        self.ensure_current()?;
        let tables = self.output_table_names();

        let tx = self.conn.transaction()?;
        let removed = delete_scenario(&tx, &tables, scenario)? + delete_iterative_runs(&tx, &tables, scenario)?;
        tx.commit()?;
        debug!(scenario = scenario, removed = removed, "Cleared scenario");
        Ok(removed)
    }

    /// Deletes the rows of iterative runs named `<scenario>-<suffix>`, leaving
    /// `scenario` itself untouched.
    pub fn clear_iterative_runs(&mut self, scenario: &str) -> Result<usize> {
        self.ensure_current()?;
        let tables = self.output_table_names();

        let tx = self.conn.transaction()?;
        let removed = delete_iterative_runs(&tx, &tables, scenario)?;
        tx.commit()?;
        debug!(scenario = scenario, removed = removed, "Cleared iterative runs");
        Ok(removed)
    }

    /// Distinct scenario names present in any output table, sorted.
    pub fn scenarios(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for table in self.output_tables() {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT DISTINCT {SCENARIO_COLUMN} FROM {table}"))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for name in rows {
                names.insert(name?);
            }
        }
        Ok(names.into_iter().collect())
    }

    fn scalar(&self, table: &str, element: &str) -> Result<Value> {
        let value = self
            .conn
            .query_row(
                &format!("SELECT value FROM {table} WHERE element = ?1"),
                [element],
                |row| row.get_ref(0).map(from_sql),
            )
            .optional()?;
        Ok(value.unwrap_or_default())
    }

    fn set_scalar(&mut self, table: &str, element: &str, value: Value) -> Result<()> {
        self.ensure_current()?;
        if table == "MetaData" && is_reserved(element) {
            return Err(StoreError::ReservedMetadata(element.to_string()));
        }
        let def = self.catalog.table(table)?;
        let row = Row::new().with("element", element).with("value", value);

        let tx = self.conn.transaction()?;
        delete_where(&tx, table, "element", &Value::from(element))?;
        Enforcer::new(&self.catalog).validate(&tx, table, &row)?;
        insert_row(&tx, def, &row)?;
        tx.commit()?;
        Ok(())
    }

    /// Integer scalar from `MetaData`, e.g. `myopic_base_year`.
    pub fn metadata(&self, element: &str) -> Result<Option<i64>> {
        Ok(self.scalar("MetaData", element)?.as_i64())
    }

    /// Sets an integer scalar in `MetaData`.
    ///
    /// # Errors
    ///
    /// [`StoreError::ReservedMetadata`] for `DB_MAJOR` and `DB_MINOR`.
    pub fn set_metadata(&mut self, element: &str, value: i64) -> Result<()> {
        self.set_scalar("MetaData", element, Value::Integer(value))
    }

    /// Real scalar from `MetaDataReal`.
    pub fn metadata_real(&self, element: &str) -> Result<Option<f64>> {
        Ok(self.scalar("MetaDataReal", element)?.as_f64())
    }

    pub fn set_metadata_real(&mut self, element: &str, value: f64) -> Result<()> {
        self.set_scalar("MetaDataReal", element, Value::Real(value))
    }

    pub fn myopic_base_year(&self) -> Result<Option<i64>> {
        self.metadata(MYOPIC_BASE_YEAR)
    }

    pub fn set_myopic_base_year(&mut self, year: i64) -> Result<()> {
        self.set_metadata(MYOPIC_BASE_YEAR, year)
    }

    pub fn global_discount_rate(&self) -> Result<Option<f64>> {
        self.metadata_real(GLOBAL_DISCOUNT_RATE)
    }

    pub fn set_global_discount_rate(&mut self, rate: f64) -> Result<()> {
        self.set_metadata_real(GLOBAL_DISCOUNT_RATE, rate)
    }

    /// SHA-256 hex digest over every catalog table's rows in key order.
    ///
    /// Two stores with equal digests hold the same data at the same shape.
    pub fn content_digest(&self) -> Result<String> {
        content_digest(&self.conn, &self.catalog)
    }

    /// Re-validates the whole store and its on-disk shape.
    pub fn verify(&self) -> Result<()> {
        schema::verify_shape(&self.conn, &self.catalog)?;
        Enforcer::new(&self.catalog).revalidate(&self.conn)
    }

    /// Reads the version marker from disk.
    pub fn stored_version(&self) -> Result<Option<SchemaVersion>> {
        stored_version(&self.conn)
    }
}

fn delete_scenario(conn: &Connection, tables: &[String], scenario: &str) -> Result<usize> {
    let value = Value::from(scenario);
    let mut removed = 0usize;
    for table in tables {
        removed += delete_where(conn, table, SCENARIO_COLUMN, &value)?;
    }
    Ok(removed)
}

/// Deletes `<scenario>-<suffix>` rows. Compared by prefix rather than `LIKE`
/// so `_` and `%` in scenario names match literally.
fn delete_iterative_runs(conn: &Connection, tables: &[String], scenario: &str) -> Result<usize> {
    let prefix = format!("{scenario}-");
    let mut removed = 0usize;
    for table in tables {
        removed += conn.execute(
            &format!(
                "DELETE FROM {table} WHERE length({SCENARIO_COLUMN}) > length(?1) \
                 AND substr({SCENARIO_COLUMN}, 1, length(?1)) = ?1"
            ),
            [&prefix],
        )?;
    }
    Ok(removed)
}

/// Validates and inserts output rows under `scenario`.
fn insert_outputs<I, T>(conn: &Connection, catalog: &Catalog, tables: &[String], scenario: &str, outputs: I) -> Result<usize>
where
    I: IntoIterator<Item = (T, Row)>,
    T: AsRef<str>,
{
    let mut written = 0usize;
    for (table, row) in outputs {
        let table = table.as_ref();
        if !tables.iter().any(|t| t == table) {
            return Err(StoreError::NotAnOutputTable(table.to_string()));
        }
        let row = row.with(SCENARIO_COLUMN, scenario);
        insert_checked(conn, catalog, table, &row)?;
        written += 1;
    }
    Ok(written)
}

fn is_reserved(element: &str) -> bool {
    element == MAJOR_ELEMENT || element == MINOR_ELEMENT
}

/// Validates `row` (defaults applied) and inserts it.
fn insert_checked(conn: &Connection, catalog: &Catalog, table: &str, row: &Row) -> Result<()> {
    if table == "MetaData" {
        if let Some(element) = row.value("element").as_str().filter(|e| is_reserved(e)) {
            return Err(StoreError::ReservedMetadata(element.to_string()));
        }
    }
    let def = catalog.table(table)?;
    let row = scenario_db_core::with_defaults(def, row);
    Enforcer::new(catalog).validate(conn, table, &row)?;
    insert_row(conn, def, &row)
}

/// Digest over `catalog`'s tables as stored on `conn`.
pub fn content_digest(conn: &Connection, catalog: &Catalog) -> Result<String> {
    let mut hasher = Sha256::new();
    for table in catalog.tables() {
        hasher.update(table.name.as_bytes());
        hasher.update([0u8]);
        for row in select_rows(conn, table)? {
            for (column, value) in row.iter() {
                hasher.update(column.as_bytes());
                hasher.update([0x1f]);
                hasher.update(value.type_name().as_bytes());
                hasher.update(value.to_string().as_bytes());
                hasher.update([0x1e]);
            }
            hasher.update([0x0a]);
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_db_core::ViolationKind;

    #[test]
    fn test_open_in_memory_is_current() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.version(), Registry::standard().latest());
        assert!(store.catalog().contains("OutputEmission"));
        assert!(store.verify().is_ok());
    }

    #[test]
    fn test_seeded_scalars() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.myopic_base_year().unwrap(), Some(2000));
        assert_eq!(store.global_discount_rate().unwrap(), Some(0.05));
    }

    #[test]
    fn test_set_scalars_replace() {
        let mut store = Store::open_in_memory().unwrap();
        store.set_global_discount_rate(0.07).unwrap();
        store.set_myopic_base_year(2025).unwrap();
        assert_eq!(store.global_discount_rate().unwrap(), Some(0.07));
        assert_eq!(store.myopic_base_year().unwrap(), Some(2025));
    }

    #[test]
    fn test_marker_rows_are_reserved() {
        let mut store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.set_metadata(MAJOR_ELEMENT, 9),
            Err(StoreError::ReservedMetadata(_))
        ));
        let row = Row::new().with("element", MINOR_ELEMENT).with("value", 9);
        assert!(matches!(
            store.insert("MetaData", row),
            Err(StoreError::ReservedMetadata(_))
        ));
    }

    #[test]
    fn test_insert_all_is_atomic() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store
            .insert_all(
                "Region",
                [Row::new().with("region", "east"), Row::new().with("region", "east")],
            )
            .unwrap_err();
        assert_eq!(err.violation().unwrap().kind, ViolationKind::PrimaryKey);
        assert!(store.rows("Region").unwrap().is_empty());
    }

    #[test]
    fn test_write_scenario_rejects_input_table() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store
            .write_scenario("base", [("Region", Row::new().with("region", "x"))])
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAnOutputTable(t) if t == "Region"));
    }

    #[test]
    fn test_digest_changes_with_content() {
        let mut store = Store::open_in_memory().unwrap();
        let before = store.content_digest().unwrap();
        assert_eq!(before.len(), 64);
        assert_eq!(before, store.content_digest().unwrap());
        store.insert("Region", Row::new().with("region", "linkville")).unwrap();
        assert_ne!(before, store.content_digest().unwrap());
    }
}
