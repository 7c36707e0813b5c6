//! The Entity Catalog: an ordered set of table definitions for one schema
//! version.
//!
//! Catalogs are not written by hand per version. The registry folds the
//! shape changes of its migration steps onto an empty catalog, so the shape
//! of any historical version is always derivable (see
//! [`Registry::schema`](crate::Registry::schema)).

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::migration::Action;
use crate::table::{Check, ColumnDef, TableDef, TableRole};
use crate::version::SchemaVersion;

/// Table definitions for one schema version, in creation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Catalog {
    version: Option<SchemaVersion>,
    tables: Vec<TableDef>,
}

impl Catalog {
    /// The catalog of an unversioned (empty) store.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn version(&self) -> Option<SchemaVersion> {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: SchemaVersion) {
        self.version = Some(version);
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn tables_with_role(&self, role: TableRole) -> impl Iterator<Item = &TableDef> {
        self.tables.iter().filter(move |t| t.role == role)
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Looks up a table, failing with [`CatalogError::UnknownTable`].
    pub fn table(&self, name: &str) -> Result<&TableDef> {
        self.get(name)
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
    }

    fn add_table(&mut self, table: TableDef) -> Result<()> {
        table.validate()?;
        if self.contains(&table.name) {
            return Err(CatalogError::DuplicateTable(table.name));
        }
        self.tables.push(table);
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        let index = self.position(name)?;
        self.tables.remove(index);
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef, checks: &[Check]) -> Result<()> {
        let index = self.position(table)?;
        let def = &mut self.tables[index];
        if def.has_column(&column.name) {
            return Err(CatalogError::DuplicateColumn {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
        def.columns.push(column.clone());
        def.checks.extend(checks.iter().cloned());
        def.validate()
    }

    /// Replaces `source` with `replacement`, keeping its position.
    fn rebuild_table(&mut self, source: &str, replacement: &TableDef) -> Result<()> {
        replacement.validate()?;
        let index = self.position(source)?;
        if replacement.name != source && self.contains(&replacement.name) {
            return Err(CatalogError::DuplicateTable(replacement.name.clone()));
        }
        self.tables[index] = replacement.clone();
        Ok(())
    }

    /// Applies the shape change of one migration action.
    ///
    /// Data-only actions (`InsertIfAbsent`, `Backfill`) only verify that the
    /// tables they touch exist.
    pub fn apply(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::CreateTable(table) => self.add_table(table.clone()),
            Action::AddColumn {
                table,
                column,
                checks,
            } => self.add_column(table, column, checks),
            Action::InsertIfAbsent { table, row } => {
                let def = self.table(table)?;
                for column in row.columns() {
                    if !def.has_column(column) {
                        return Err(CatalogError::UnknownColumn {
                            table: table.clone(),
                            column: column.to_string(),
                        });
                    }
                }
                Ok(())
            }
            Action::RebuildTable {
                source,
                replacement,
                ..
            } => self.rebuild_table(source, replacement),
            Action::Backfill { target, columns, .. } => {
                let def = self.table(target)?;
                match columns.iter().find(|c| !def.has_column(c)) {
                    Some(column) => Err(CatalogError::UnknownColumn {
                        table: target.clone(),
                        column: column.clone(),
                    }),
                    None => Ok(()),
                }
            }
            Action::DropTable(name) => self.drop_table(name),
        }
    }

    /// Checks that every foreign key and link rule points at a declared
    /// table and column.
    pub fn validate_references(&self) -> Result<()> {
        for table in &self.tables {
            for fk in &table.foreign_keys {
                let target = self.table(&fk.ref_table)?;
                for column in &fk.ref_columns {
                    if !target.has_column(column) {
                        return Err(CatalogError::UnknownColumn {
                            table: target.name.clone(),
                            column: column.clone(),
                        });
                    }
                }
            }
            for link in &table.links {
                let target = self.table(&link.table)?;
                if !target.has_column(&link.key) {
                    return Err(CatalogError::UnknownColumn {
                        table: target.name.clone(),
                        column: link.key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
