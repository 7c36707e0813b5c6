//! Migration Runner.
//!
//! Moves a store from its stored schema version to a target version, one
//! registry step at a time, inside a single transaction:
//!
//! 1. read the version marker (`MetaData` rows `DB_MAJOR`, `DB_MINOR`)
//! 2. refuse downgrades and unknown versions
//! 3. verify the on-disk shape of the stored version
//! 4. resolve the pending chain (a gap leaves the store untouched)
//! 5. suspend foreign keys, apply every action of every step
//! 6. re-validate the whole store against the target catalog
//! 7. write the marker last and commit
//!
//! Any failure rolls the transaction back and the store is left exactly as it
//! was. Foreign-key enforcement is restored when the suspension guard drops,
//! on success and failure alike.
//!
//! # Example
//!
//! ```no_run
//! use rusqlite::Connection;
//! use scenario_db_sqlite::Migrator;
//!
//! let conn = Connection::open("scenario.sqlite").unwrap();
//! let report = Migrator::new(&conn).upgrade_with_report().unwrap();
//! for step in &report.applied {
//!     println!("applied {step}");
//! }
//! ```

use rusqlite::{Connection, OptionalExtension};
use scenario_db_core::{
    Action, Catalog, CatalogError, ConstraintViolation, MAJOR_ELEMENT, MINOR_ELEMENT, MigrationStep,
    Registry, SchemaVersion, TableDef, Value, ViolationKind, display_version, with_defaults,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::convert::{from_sql, insert_row, project, row_exists};
use crate::enforce::Enforcer;
use crate::error::{Result, StoreError};
use crate::schema::{self, add_column_sql, create_table_sql, create_table_sql_as};

/// Outcome of an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Version before the upgrade; `None` for a fresh store.
    pub from: Option<SchemaVersion>,
    pub to: SchemaVersion,
    /// Labels of the applied steps, oldest first.
    pub applied: Vec<String>,
}

impl MigrationReport {
    /// Whether the store was already at the target.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Turns `PRAGMA foreign_keys` off for its lifetime.
///
/// The pragma is a no-op inside a transaction, so the guard must be created
/// before the migration transaction opens and dropped after it closes.
struct EnforcementSuspension<'c> {
    conn: &'c Connection,
    restore: bool,
}

impl<'c> EnforcementSuspension<'c> {
    fn begin(conn: &'c Connection) -> Result<Self> {
        let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        Ok(Self {
            conn,
            restore: enabled != 0,
        })
    }
}

impl Drop for EnforcementSuspension<'_> {
    fn drop(&mut self) {
        if !self.restore {
            return;
        }
        if let Err(e) = self.conn.execute_batch("PRAGMA foreign_keys = ON;") {
            warn!(error = %e, "Failed to restore foreign key enforcement");
        }
    }
}

fn read_marker_element(conn: &Connection, element: &str) -> Result<Option<i64>> {
    let value = conn
        .query_row(
            "SELECT value FROM MetaData WHERE element = ?1",
            [element],
            |row| row.get_ref(0).map(from_sql),
        )
        .optional()?;
    match value {
        None => Ok(None),
        Some(Value::Integer(i)) => Ok(Some(i)),
        Some(other) => Err(StoreError::SchemaMismatch {
            table: "MetaData".to_string(),
            detail: format!("{element} holds {other}, expected an integer"),
        }),
    }
}

fn marker_component(element: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::SchemaMismatch {
        table: "MetaData".to_string(),
        detail: format!("{element} holds {value}, expected a non-negative version"),
    })
}

/// Reads the version marker.
///
/// A store with no tables at all is unversioned (`None`). A store with tables
/// but no complete marker is a [`StoreError::SchemaMismatch`].
pub fn stored_version(conn: &Connection) -> Result<Option<SchemaVersion>> {
    if !schema::table_exists(conn, "MetaData")? {
        let tables = schema::user_tables(conn)?;
        if tables.is_empty() {
            return Ok(None);
        }
        return Err(StoreError::SchemaMismatch {
            table: "MetaData".to_string(),
            detail: format!("store has {} tables but no version marker", tables.len()),
        });
    }

    let major = read_marker_element(conn, MAJOR_ELEMENT)?;
    let minor = read_marker_element(conn, MINOR_ELEMENT)?;
    match (major, minor) {
        (Some(major), Some(minor)) => Ok(Some(SchemaVersion::new(
            marker_component(MAJOR_ELEMENT, major)?,
            marker_component(MINOR_ELEMENT, minor)?,
        ))),
        _ => Err(StoreError::SchemaMismatch {
            table: "MetaData".to_string(),
            detail: "version marker is missing or incomplete".to_string(),
        }),
    }
}

fn write_marker(conn: &Connection, version: SchemaVersion) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO MetaData (element, value, notes) VALUES (?1, ?2, ?3) \
         ON CONFLICT(element) DO UPDATE SET value = excluded.value",
    )?;
    stmt.execute((MAJOR_ELEMENT, i64::from(version.major), "database schema major version"))?;
    stmt.execute((MINOR_ELEMENT, i64::from(version.minor), "database schema minor version"))?;
    Ok(())
}

/// Runs registry steps against a connection.
pub struct Migrator<'c> {
    conn: &'c Connection,
    registry: Registry,
}

impl<'c> Migrator<'c> {
    /// A runner over the standard registry.
    pub fn new(conn: &'c Connection) -> Self {
        Self::with_registry(conn, Registry::standard())
    }

    pub fn with_registry(conn: &'c Connection, registry: Registry) -> Self {
        Self { conn, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stored_version(&self) -> Result<Option<SchemaVersion>> {
        stored_version(self.conn)
    }

    fn latest(&self) -> Result<SchemaVersion> {
        self.registry.latest().ok_or(StoreError::EmptyRegistry)
    }

    /// Upgrades to the registry's latest version.
    ///
    /// # Errors
    ///
    /// See [`upgrade_to`](Self::upgrade_to).
    pub fn upgrade(&self) -> Result<SchemaVersion> {
        Ok(self.run(self.latest()?)?.to)
    }

    /// Upgrades to `target`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DowngradeUnsupported`] if the store is newer than `target`
    /// - [`StoreError::SchemaMismatch`] if the on-disk shape is not the stored version's
    /// - [`StoreError::CatalogError`] with [`CatalogError::MigrationGap`] if no chain exists
    /// - [`StoreError::StepFailed`] if an action or the final re-validation fails
    ///
    /// In every case the store is left unchanged.
    pub fn upgrade_to(&self, target: SchemaVersion) -> Result<SchemaVersion> {
        Ok(self.run(target)?.to)
    }

    /// Upgrades to the latest version and reports what was applied.
    pub fn upgrade_with_report(&self) -> Result<MigrationReport> {
        self.run(self.latest()?)
    }

    /// Verifies the on-disk shape of the stored version without migrating.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DowngradeUnsupported`] if the store is newer than every known version
    /// - [`StoreError::CatalogError`] with [`CatalogError::MigrationGap`] for an unknown older version
    /// - [`StoreError::SchemaMismatch`] if the on-disk shape is not the stored version's
    pub fn verify(&self) -> Result<Option<SchemaVersion>> {
        let Some(version) = self.stored_version()? else {
            return Ok(None);
        };
        let latest = self.latest()?;
        if version > latest {
            return Err(StoreError::DowngradeUnsupported {
                stored: version,
                supported: latest,
            });
        }
        if !self.registry.knows(version) {
            return Err(CatalogError::MigrationGap {
                from: Some(version),
                to: latest,
            }
            .into());
        }

        let catalog = self.registry.schema(version)?;
        schema::verify_shape(self.conn, &catalog)?;
        Ok(Some(version))
    }

    fn run(&self, target: SchemaVersion) -> Result<MigrationReport> {
        if !self.registry.knows(target) {
            return Err(CatalogError::UnknownVersion(target).into());
        }

        let stored = self.stored_version()?;
        if let Some(version) = stored.filter(|v| *v > target) {
            return Err(StoreError::DowngradeUnsupported {
                stored: version,
                supported: target,
            });
        }

        if let Some(version) = stored.filter(|v| self.registry.knows(*v)) {
            let catalog = self.registry.schema(version)?;
            schema::verify_shape(self.conn, &catalog)?;
        }

        let steps = self.registry.pending_steps(stored, target)?;
        if steps.is_empty() {
            debug!(version = %target, "Store already at target version");
            return Ok(MigrationReport {
                from: stored,
                to: target,
                applied: Vec::new(),
            });
        }

        info!(
            from = %display_version(&stored),
            to = %target,
            steps = steps.len(),
            "Upgrading store"
        );

        match self.apply(stored, target, &steps) {
            Ok(()) => {
                info!(from = %display_version(&stored), to = %target, "Upgrade committed");
                Ok(MigrationReport {
                    from: stored,
                    to: target,
                    applied: steps.iter().map(|s| s.label()).collect(),
                })
            }
            Err(e) => {
                warn!(
                    from = %display_version(&stored),
                    to = %target,
                    error = %e,
                    "Upgrade rolled back"
                );
                Err(e)
            }
        }
    }

    fn apply(&self, stored: Option<SchemaVersion>, target: SchemaVersion, steps: &[&MigrationStep]) -> Result<()> {
        let _suspension = EnforcementSuspension::begin(self.conn)?;
        let tx = self.conn.unchecked_transaction()?;

        let mut catalog = match stored {
            Some(version) => self.registry.schema(version)?,
            None => Catalog::empty(),
        };

        for step in steps {
            info!(step = %step.label(), actions = step.actions.len(), "Applying migration step");
            for action in &step.actions {
                apply_action(&tx, &mut catalog, action).map_err(|source| StoreError::StepFailed {
                    step: step.label(),
                    source: Box::new(source),
                })?;
            }
        }

        let target_catalog = self.registry.schema(target)?;
        let validated = Enforcer::new(&target_catalog)
            .revalidate(&tx)
            .and_then(|()| schema::verify_shape(&tx, &target_catalog));
        if let Err(source) = validated {
            let last = steps.last().map_or_else(|| target.to_string(), |s| s.label());
            return Err(StoreError::StepFailed {
                step: last,
                source: Box::new(source),
            });
        }

        write_marker(&tx, target)?;
        tx.commit()?;
        Ok(())
    }
}

fn apply_action(conn: &Connection, catalog: &mut Catalog, action: &Action) -> Result<()> {
    debug!(action = %action.describe(), "Applying action");
    match action {
        Action::CreateTable(table) => {
            catalog.apply(action)?;
            conn.execute_batch(&create_table_sql(table))?;
        }
        Action::AddColumn { table, column, checks } => {
            catalog.apply(action)?;
            let def = catalog.table(table)?;
            conn.execute_batch(&add_column_sql(def, column, checks))?;
        }
        Action::InsertIfAbsent { table, row } => {
            catalog.apply(action)?;
            let def = catalog.table(table)?;
            let row = with_defaults(def, row);
            if !def.primary_key.is_empty()
                && row_exists(conn, table, &def.primary_key, &project(&row, &def.primary_key))?
            {
                debug!(table = %table, "Lookup row already present");
                return Ok(());
            }
            Enforcer::without_foreign_keys(catalog).validate(conn, table, &row)?;
            insert_row(conn, def, &row)?;
        }
        Action::RebuildTable {
            source,
            replacement,
            projection,
        } => {
            if let Some((column, _)) = projection.iter().find(|(c, _)| !replacement.has_column(c)) {
                return Err(CatalogError::UnknownColumn {
                    table: replacement.name.clone(),
                    column: column.clone(),
                }
                .into());
            }
            catalog.apply(action)?;
            rebuild_table(conn, source, replacement, projection)?;
        }
        Action::Backfill { target, columns, select } => {
            catalog.apply(action)?;
            let inserted = conn.execute(&format!("INSERT INTO {target} ({}) {select}", columns.join(", ")), [])?;
            debug!(table = %target, rows = inserted, "Backfilled table");
        }
        Action::DropTable(name) => {
            catalog.apply(action)?;
            conn.execute_batch(&format!("DROP TABLE {name};"))?;
        }
    }
    Ok(())
}

/// Source expressions feeding the replacement's primary key columns.
fn key_expressions<'p>(replacement: &TableDef, projection: &'p [(String, String)]) -> Vec<&'p str> {
    replacement
        .primary_key
        .iter()
        .filter_map(|key| {
            projection
                .iter()
                .find(|(column, _)| column == key)
                .map(|(_, expr)| expr.as_str())
        })
        .collect()
}

/// Rows of `source` that would collide on the replacement's key.
fn find_collision(
    conn: &Connection,
    source: &str,
    replacement: &TableDef,
    projection: &[(String, String)],
) -> Result<Option<Vec<Value>>> {
    let exprs = key_expressions(replacement, projection);
    if exprs.is_empty() || exprs.len() != replacement.primary_key.len() {
        return Ok(None);
    }
    let list = exprs.join(", ");
    let sql = format!("SELECT {list} FROM {source} GROUP BY {list} HAVING COUNT(*) > 1 LIMIT 1");
    let collision = conn
        .query_row(&sql, [], |row| {
            (0..exprs.len())
                .map(|i| row.get_ref(i).map(from_sql))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .optional()?;
    Ok(collision)
}

/// Shadow-table rebuild: create `<name>__rebuild`, copy through the
/// projection, drop the source, rename the shadow into place.
fn rebuild_table(
    conn: &Connection,
    source: &str,
    replacement: &TableDef,
    projection: &[(String, String)],
) -> Result<()> {
    if let Some(values) = find_collision(conn, source, replacement, projection)? {
        return Err(ConstraintViolation::for_key(
            ViolationKind::PrimaryKey,
            &replacement.name,
            &replacement.primary_key,
            &values,
        )
        .into());
    }

    let shadow = format!("{}__rebuild", replacement.name);
    let targets = projection.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>();
    let exprs = projection.iter().map(|(_, e)| e.as_str()).collect::<Vec<_>>();

    conn.execute_batch(&create_table_sql_as(replacement, &shadow))?;
    let copied = conn.execute(
        &format!(
            "INSERT INTO {shadow} ({}) SELECT {} FROM {source}",
            targets.join(", "),
            exprs.join(", ")
        ),
        [],
    )?;
    conn.execute_batch(&format!(
        "DROP TABLE {source};\nALTER TABLE {shadow} RENAME TO {};",
        replacement.name
    ))?;
    debug!(source = %source, table = %replacement.name, rows = copied, "Rebuilt table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_db_core::history::{V3_0, V3_1, V3_4};

    #[test]
    fn test_fresh_store_is_unversioned() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(stored_version(&conn).unwrap(), None);
    }

    #[test]
    fn test_tables_without_marker_is_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE Region (region TEXT PRIMARY KEY);").unwrap();
        assert!(matches!(stored_version(&conn), Err(StoreError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_upgrade_fresh_store_to_latest() {
        let conn = Connection::open_in_memory().unwrap();
        let report = Migrator::new(&conn).upgrade_with_report().unwrap();
        assert_eq!(report.from, None);
        assert_eq!(report.to, V3_4);
        assert_eq!(report.applied.len(), 5);
        assert_eq!(stored_version(&conn).unwrap(), Some(V3_4));
    }

    #[test]
    fn test_upgrade_is_noop_when_current() {
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(&conn);
        migrator.upgrade().unwrap();
        let report = migrator.upgrade_with_report().unwrap();
        assert!(report.is_noop());
    }

    #[test]
    fn test_upgrade_to_intermediate_version() {
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(&conn);
        assert_eq!(migrator.upgrade_to(V3_0).unwrap(), V3_0);
        assert_eq!(migrator.upgrade_to(V3_1).unwrap(), V3_1);
        assert_eq!(stored_version(&conn).unwrap(), Some(V3_1));
    }

    #[test]
    fn test_foreign_keys_restored_after_upgrade() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        Migrator::new(&conn).upgrade().unwrap();
        let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(enabled, 1);
    }

    fn set_marker(conn: &Connection, major: i64, minor: i64) {
        conn.execute("UPDATE MetaData SET value = ?1 WHERE element = 'DB_MAJOR'", [major])
            .unwrap();
        conn.execute("UPDATE MetaData SET value = ?1 WHERE element = 'DB_MINOR'", [minor])
            .unwrap();
    }

    #[test]
    fn test_verify_newer_store_is_downgrade() {
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(&conn);
        migrator.upgrade().unwrap();
        set_marker(&conn, 9, 9);

        match migrator.verify().unwrap_err() {
            StoreError::DowngradeUnsupported { stored, supported } => {
                assert_eq!(stored, SchemaVersion::new(9, 9));
                assert_eq!(supported, V3_4);
            }
            other => panic!("expected DowngradeUnsupported, got {other}"),
        }
    }

    #[test]
    fn test_verify_unknown_older_store_is_gap() {
        let conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(&conn);
        migrator.upgrade_to(V3_0).unwrap();
        set_marker(&conn, 2, 5);

        let err = migrator.verify().unwrap_err();
        assert!(matches!(
            err,
            StoreError::CatalogError(CatalogError::MigrationGap { from: Some(_), to: V3_4 })
        ));
    }

    #[test]
    fn test_empty_registry() {
        let conn = Connection::open_in_memory().unwrap();
        let err = Migrator::with_registry(&conn, Registry::new()).upgrade().unwrap_err();
        assert!(matches!(err, StoreError::EmptyRegistry));
    }

    #[test]
    fn test_report_serializes() {
        let report = MigrationReport {
            from: Some(V3_0),
            to: V3_1,
            applied: vec!["3.0 -> 3.1 (unlimited capacity flag)".to_string()],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["to"]["minor"], 1);
    }
}
