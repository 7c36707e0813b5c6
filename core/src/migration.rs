//! Migration step registry.
//!
//! A [`MigrationStep`] is a discrete, versioned transformation described as
//! data ([`Action`]s). The same actions drive two things:
//!
//! - the *shape* change, folded onto a [`Catalog`] to derive the table
//!   definitions of any version, and
//! - the *data* change, executed against a store by the SQLite runner.
//!
//! [`Registry`] holds an append-only, ordered list of steps and resolves the
//! chain needed to move a store from its stored version to a target.
//!
//! # Example
//!
//! ```
//! use scenario_db_core::{Registry, SchemaVersion};
//!
//! let registry = Registry::standard();
//! let target = registry.latest().unwrap();
//!
//! // A fresh store needs every step.
//! let all = registry.pending_steps(None, target).unwrap();
//! assert_eq!(all.len(), registry.steps().len());
//!
//! // A store already at the target needs none.
//! assert!(registry.pending_steps(Some(target), target).unwrap().is_empty());
//!
//! let catalog = registry.schema(SchemaVersion::new(3, 0)).unwrap();
//! assert!(catalog.contains("Output_Emissions"));
//! ```

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{CatalogError, Result};
use crate::table::{Check, ColumnDef, TableDef};
use crate::value::Row;
use crate::version::SchemaVersion;

/// One atomic transformation inside a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Introduces a new table outright.
    CreateTable(TableDef),
    /// Adds a column (with its default) and any checks on it.
    AddColumn {
        table: String,
        column: ColumnDef,
        checks: Vec<Check>,
    },
    /// Inserts a lookup or seed row unless its primary key is present.
    InsertIfAbsent { table: String, row: Row },
    /// Replaces `source` with `replacement`.
    ///
    /// Executed as: create a shadow table with the replacement shape, copy
    /// rows through `projection` (`(target column, source SQL expression)`),
    /// drop the original, rename the shadow into place.
    RebuildTable {
        source: String,
        replacement: TableDef,
        projection: Vec<(String, String)>,
    },
    /// `INSERT INTO target (columns) <select>`, populating a table from
    /// existing ones.
    Backfill {
        target: String,
        columns: Vec<String>,
        select: String,
    },
    DropTable(String),
}

impl Action {
    /// Short human-readable form for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            Action::CreateTable(table) => format!("create table {}", table.name),
            Action::AddColumn { table, column, .. } => {
                format!("add column {}.{}", table, column.name)
            }
            Action::InsertIfAbsent { table, .. } => format!("insert lookup row into {table}"),
            Action::RebuildTable {
                source,
                replacement,
                ..
            } => format!("rebuild {} as {}", source, replacement.name),
            Action::Backfill { target, .. } => format!("backfill {target}"),
            Action::DropTable(name) => format!("drop table {name}"),
        }
    }
}

/// A versioned transformation from `from` to `to`.
///
/// `from == None` marks the baseline step that initializes an unversioned
/// store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub from: Option<SchemaVersion>,
    pub to: SchemaVersion,
    pub description: String,
    pub actions: Vec<Action>,
}

impl MigrationStep {
    pub fn new(from: Option<SchemaVersion>, to: SchemaVersion, description: impl Into<String>) -> Self {
        Self {
            from,
            to,
            description: description.into(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// `"3.0 -> 3.1 (description)"`, used to identify a failing step.
    pub fn label(&self) -> String {
        format!(
            "{} -> {} ({})",
            crate::version::display_version(&self.from),
            self.to,
            self.description
        )
    }
}

/// Ordered, append-only list of migration steps.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    steps: Vec<MigrationStep>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shipped with this crate: baseline 3.0 through 3.4.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for step in crate::history::standard_steps() {
            // The shipped chain is ordered by construction.
            registry.steps.push(step);
        }
        registry
    }

    /// Appends a step.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::OutOfOrderStep`] if the step does not move
    /// forward, or starts before the previous step ends.
    pub fn register(&mut self, step: MigrationStep) -> Result<()> {
        let last = self.latest();
        let moves_forward = step.from < Some(step.to);
        let follows_last = last.is_none() || step.from >= last;
        if !moves_forward || !follows_last {
            return Err(CatalogError::OutOfOrderStep {
                from: step.from,
                to: step.to,
                last,
            });
        }
        self.steps.push(step);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_step(mut self, step: MigrationStep) -> Result<Self> {
        self.register(step)?;
        Ok(self)
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// The newest version any step produces.
    pub fn latest(&self) -> Option<SchemaVersion> {
        self.steps.last().map(|s| s.to)
    }

    /// Whether some step produces `version`.
    pub fn knows(&self, version: SchemaVersion) -> bool {
        self.steps.iter().any(|s| s.to == version)
    }

    /// The contiguous chain of steps leading from `current` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::MigrationGap`] when no such chain exists,
    /// including when `current` is newer than `target`.
    pub fn pending_steps(
        &self,
        current: Option<SchemaVersion>,
        target: SchemaVersion,
    ) -> Result<Vec<&MigrationStep>> {
        if current == Some(target) {
            return Ok(Vec::new());
        }

        let mut cursor = current;
        let mut chain = Vec::new();
        for step in &self.steps {
            if step.from == cursor && step.to <= target {
                chain.push(step);
                cursor = Some(step.to);
                if cursor == Some(target) {
                    return Ok(chain);
                }
            }
        }

        Err(CatalogError::MigrationGap {
            from: current,
            to: target,
        })
    }

    /// Table definitions of `version`, derived by folding every step up to
    /// and including the one that produces it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownVersion`] if no step produces
    /// `version`, or any catalog error raised while folding.
    pub fn schema(&self, version: SchemaVersion) -> Result<Catalog> {
        if !self.knows(version) {
            return Err(CatalogError::UnknownVersion(version));
        }

        let mut catalog = Catalog::empty();
        for step in self.steps.iter().take_while(|s| s.to <= version) {
            for action in &step.actions {
                catalog.apply(action)?;
            }
            catalog.set_version(step.to);
        }
        catalog.validate_references()?;
        Ok(catalog)
    }

    /// Table definitions of [`latest`](Self::latest).
    pub fn current_schema(&self) -> Result<Catalog> {
        match self.latest() {
            Some(version) => self.schema(version),
            None => Ok(Catalog::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableRole;

    fn v(major: u32, minor: u32) -> SchemaVersion {
        SchemaVersion::new(major, minor)
    }

    fn table(name: &str) -> TableDef {
        TableDef::new(name, TableRole::Input)
            .column(ColumnDef::text("id"))
            .primary_key(["id"])
    }

    fn small_registry() -> Registry {
        Registry::new()
            .with_step(MigrationStep::new(None, v(1, 0), "base").action(Action::CreateTable(table("A"))))
            .unwrap()
            .with_step(MigrationStep::new(Some(v(1, 0)), v(1, 1), "add B").action(Action::CreateTable(table("B"))))
            .unwrap()
            .with_step(MigrationStep::new(Some(v(1, 1)), v(1, 2), "drop A").action(Action::DropTable("A".into())))
            .unwrap()
    }

    #[test]
    fn test_pending_steps_full_chain() {
        let registry = small_registry();
        let steps = registry.pending_steps(None, v(1, 2)).unwrap();
        let targets: Vec<_> = steps.iter().map(|s| s.to).collect();
        assert_eq!(targets, vec![v(1, 0), v(1, 1), v(1, 2)]);
    }

    #[test]
    fn test_pending_steps_partial_chain() {
        let registry = small_registry();
        let steps = registry.pending_steps(Some(v(1, 0)), v(1, 1)).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].description, "add B");
    }

    #[test]
    fn test_pending_steps_gap() {
        let registry = Registry::new()
            .with_step(MigrationStep::new(None, v(1, 0), "base"))
            .unwrap()
            .with_step(MigrationStep::new(Some(v(1, 1)), v(1, 2), "after gap"))
            .unwrap();
        assert_eq!(
            registry.pending_steps(Some(v(1, 0)), v(1, 2)).unwrap_err(),
            CatalogError::MigrationGap {
                from: Some(v(1, 0)),
                to: v(1, 2)
            }
        );
    }

    #[test]
    fn test_pending_steps_unknown_stored_version() {
        let registry = small_registry();
        assert!(matches!(
            registry.pending_steps(Some(v(0, 9)), v(1, 2)),
            Err(CatalogError::MigrationGap { .. })
        ));
    }

    #[test]
    fn test_register_rejects_out_of_order() {
        let mut registry = small_registry();
        let err = registry
            .register(MigrationStep::new(Some(v(1, 0)), v(1, 3), "late"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::OutOfOrderStep { .. }));

        let err = registry
            .register(MigrationStep::new(Some(v(1, 4)), v(1, 3), "backwards"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::OutOfOrderStep { .. }));
    }

    #[test]
    fn test_schema_folds_history() {
        let registry = small_registry();
        let at_1_1 = registry.schema(v(1, 1)).unwrap();
        assert!(at_1_1.contains("A") && at_1_1.contains("B"));
        assert_eq!(at_1_1.version(), Some(v(1, 1)));

        let at_1_2 = registry.schema(v(1, 2)).unwrap();
        assert!(!at_1_2.contains("A"));
        assert!(at_1_2.contains("B"));
    }

    #[test]
    fn test_schema_unknown_version() {
        assert_eq!(
            small_registry().schema(v(9, 9)).unwrap_err(),
            CatalogError::UnknownVersion(v(9, 9))
        );
    }

    #[test]
    fn test_step_label() {
        let step = MigrationStep::new(None, v(3, 0), "baseline");
        assert_eq!(step.label(), "unversioned -> 3.0 (baseline)");
    }
}
