//! The shipped migration chain.
//!
//! | step        | change                                                   |
//! |-------------|----------------------------------------------------------|
//! | `∅ -> 3.0`  | baseline tables and seed rows                            |
//! | `3.0 -> 3.1`| `Technology.unlim_cap` flag, `ps` technology type        |
//! | `3.1 -> 3.2`| keyed `OutputEmission` replaces `Output_Emissions`       |
//! | `3.2 -> 3.3`| long-format `Output_Costs_2` replaces `OutputCost`       |
//! | `3.3 -> 3.4`| optional `units` on commodities, processes and outputs   |

use crate::entities::{self, LEGACY_COST_COLUMNS};
use crate::migration::{Action, MigrationStep};
use crate::table::{Check, ColumnDef};
use crate::value::Row;
use crate::version::SchemaVersion;

pub const V3_0: SchemaVersion = SchemaVersion::new(3, 0);
pub const V3_1: SchemaVersion = SchemaVersion::new(3, 1);
pub const V3_2: SchemaVersion = SchemaVersion::new(3, 2);
pub const V3_3: SchemaVersion = SchemaVersion::new(3, 3);
pub const V3_4: SchemaVersion = SchemaVersion::new(3, 4);

/// Tables that gain an optional `units` column in 3.4.
pub const UNITS_TABLES: &[&str] = &[
    "Commodity",
    "Efficiency",
    "CapacityToActivity",
    "StorageDuration",
    "LifetimeTech",
    "LifetimeProcess",
    "LoanLifetimeTech",
    "OutputObjective",
    "OutputBuiltCapacity",
    "OutputNetCapacity",
    "OutputRetiredCapacity",
    "OutputFlowIn",
    "OutputFlowOut",
    "OutputCurtailment",
    "OutputEmission",
    "Output_Costs_2",
];

pub fn baseline() -> MigrationStep {
    let tables = entities::baseline_tables()
        .into_iter()
        .map(Action::CreateTable);
    let seeds = entities::baseline_seeds()
        .into_iter()
        .map(|(table, row)| Action::InsertIfAbsent { table, row });

    MigrationStep::new(None, V3_0, "baseline schema")
        .actions(tables)
        .actions(seeds)
}

pub fn unlimited_capacity() -> MigrationStep {
    MigrationStep::new(Some(V3_0), V3_1, "unlimited capacity flag")
        .action(Action::AddColumn {
            table: "Technology".into(),
            column: ColumnDef::integer("unlim_cap").default_value(0),
            checks: vec![Check::flag("unlim_cap")],
        })
        .action(Action::InsertIfAbsent {
            table: "TechnologyType".into(),
            row: Row::new()
                .with("label", "ps")
                .with("description", "peaking storage technology"),
        })
}

pub fn keyed_emission_output() -> MigrationStep {
    let replacement = entities::emission_output();
    let projection = replacement
        .column_names()
        .map(|c| (c.to_string(), c.to_string()))
        .collect();

    MigrationStep::new(Some(V3_1), V3_2, "keyed emission output").action(Action::RebuildTable {
        source: "Output_Emissions".into(),
        replacement,
        projection,
    })
}

/// Unpivots the wide legacy cost columns into one row per non-null cell.
fn unpivot_legacy_costs() -> String {
    LEGACY_COST_COLUMNS
        .iter()
        .map(|(column, kind, discounted)| {
            format!(
                "SELECT c.scenario, c.region, t.sector, c.period, c.tech, c.vintage, '{kind}', {}, c.{column} \
                 FROM OutputCost AS c LEFT JOIN Technology AS t ON t.tech = c.tech \
                 WHERE c.{column} IS NOT NULL",
                i32::from(*discounted)
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

pub fn long_format_costs() -> MigrationStep {
    let table = entities::cost_output();
    let columns = table.column_names().map(str::to_string).collect();
    let target = table.name.clone();

    MigrationStep::new(Some(V3_2), V3_3, "long-format cost output")
        .action(Action::CreateTable(table))
        .action(Action::Backfill {
            target,
            columns,
            select: unpivot_legacy_costs(),
        })
        .action(Action::DropTable("OutputCost".into()))
}

pub fn units() -> MigrationStep {
    let actions = UNITS_TABLES.iter().map(|table| Action::AddColumn {
        table: table.to_string(),
        column: entities::units(),
        checks: Vec::new(),
    });
    MigrationStep::new(Some(V3_3), V3_4, "units columns").actions(actions)
}

/// Every shipped step, oldest first.
pub fn standard_steps() -> Vec<MigrationStep> {
    vec![
        baseline(),
        unlimited_capacity(),
        keyed_emission_output(),
        long_format_costs(),
        units(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;
    use crate::table::TableRole;

    #[test]
    fn test_standard_chain_is_contiguous() {
        let steps = standard_steps();
        assert_eq!(steps[0].from, None);
        for pair in steps.windows(2) {
            assert_eq!(pair[1].from, Some(pair[0].to));
        }
        assert_eq!(steps.last().unwrap().to, V3_4);
    }

    #[test]
    fn test_every_version_schema_folds() {
        let registry = Registry::standard();
        for version in [V3_0, V3_1, V3_2, V3_3, V3_4] {
            let catalog = registry.schema(version).unwrap();
            assert_eq!(catalog.version(), Some(version));
        }
    }

    #[test]
    fn test_unlim_cap_appears_in_3_1() {
        let registry = Registry::standard();
        let before = registry.schema(V3_0).unwrap();
        let after = registry.schema(V3_1).unwrap();
        assert!(!before.table("Technology").unwrap().has_column("unlim_cap"));
        assert!(after.table("Technology").unwrap().has_column("unlim_cap"));
    }

    #[test]
    fn test_emission_output_renamed_in_3_2() {
        let catalog = Registry::standard().schema(V3_2).unwrap();
        assert!(!catalog.contains("Output_Emissions"));
        let table = catalog.table("OutputEmission").unwrap();
        assert_eq!(table.primary_key.len(), 6);
    }

    #[test]
    fn test_costs_are_long_format_in_3_3() {
        let catalog = Registry::standard().schema(V3_3).unwrap();
        assert!(!catalog.contains("OutputCost"));
        assert!(catalog.contains("Output_Costs_2"));
    }

    #[test]
    fn test_units_added_in_3_4() {
        let catalog = Registry::standard().schema(V3_4).unwrap();
        for table in UNITS_TABLES {
            assert!(catalog.table(table).unwrap().has_column("units"), "{table}");
        }
        assert!(
            catalog
                .tables_with_role(TableRole::Output)
                .all(|t| t.has_column("units") || t.name == "OutputDualVariable")
        );
    }

    #[test]
    fn test_unpivot_covers_every_legacy_column() {
        let sql = unpivot_legacy_costs();
        assert_eq!(sql.matches("UNION ALL").count(), LEGACY_COST_COLUMNS.len() - 1);
        assert!(sql.contains("'variable', 1, c.d_var"));
        assert!(sql.contains("'emission', 0, c.emiss"));
    }
}
