//! Declarative table definitions of the energy-system model.
//!
//! Tables are grouped the way a model author thinks about them: metadata,
//! fixed label sets, the temporal skeleton, topology, process parameters,
//! economics, constraint parameters and solver outputs. Each group returns
//! a `Vec<TableDef>` in creation order.
//!
//! Definitions that only exist from a later version on (the keyed emission
//! output, the long-format cost output) live here too and are introduced by
//! the steps in [`history`](crate::history).

use crate::table::{Check, ColumnDef, TableDef, TableRole};
use crate::value::{Row, Value};

pub const SECTOR_LABELS: &[&str] = &[
    "supply",
    "electric",
    "transport",
    "commercial",
    "residential",
    "industrial",
    "agriculture",
];

/// `(label, description)` for commodity flags.
pub const COMMODITY_TYPES: &[(&str, &str)] = &[
    ("s", "source commodity"),
    ("p", "physical commodity"),
    ("e", "emissions commodity"),
    ("d", "demand commodity"),
];

/// `(label, description)` for technology flags present in the baseline.
pub const TECHNOLOGY_TYPES: &[(&str, &str)] = &[
    ("r", "resource technology"),
    ("p", "production technology"),
    ("pb", "baseload production technology"),
];

pub const TIME_PERIOD_TYPES: &[(&str, &str)] = &[
    ("e", "existing vintages"),
    ("f", "future"),
];

/// `MetaData` element holding the base year of a myopic run.
pub const MYOPIC_BASE_YEAR: &str = "myopic_base_year";

/// `MetaDataReal` element holding the global discount rate.
pub const GLOBAL_DISCOUNT_RATE: &str = "global_discount_rate";

/// `MetaDataReal` element holding the loan rate used when `LoanRate` is silent.
pub const DEFAULT_LOAN_RATE: &str = "default_loan_rate";

/// Name of the scenario column every output table is partitioned by.
pub const SCENARIO_COLUMN: &str = "scenario";

fn text(name: &str) -> ColumnDef {
    ColumnDef::text(name)
}

fn integer(name: &str) -> ColumnDef {
    ColumnDef::integer(name)
}

fn real(name: &str) -> ColumnDef {
    ColumnDef::real(name)
}

fn notes() -> ColumnDef {
    ColumnDef::text("notes").optional()
}

pub(crate) fn units() -> ColumnDef {
    ColumnDef::text("units").optional()
}

/// An integer `0/1` column defaulting to `0`.
fn flag_column(name: &str) -> ColumnDef {
    ColumnDef::integer(name).default_value(0)
}

fn lookup(name: &str) -> TableDef {
    TableDef::new(name, TableRole::Lookup)
        .column(text("label"))
        .column(text("description").optional())
        .primary_key(["label"])
}

fn input(name: &str) -> TableDef {
    TableDef::new(name, TableRole::Input)
}

fn output(name: &str) -> TableDef {
    TableDef::new(name, TableRole::Output).column(text(SCENARIO_COLUMN))
}

/// `region, period, tech` keyed bound: `MaxActivity`, `MinCapacity`, ...
fn tech_period_bound(name: &str, value: &str) -> TableDef {
    input(name)
        .column(text("region"))
        .column(integer("period"))
        .column(text("tech"))
        .column(real(value))
        .column(units())
        .column(notes())
        .primary_key(["region", "period", "tech"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["tech"], "Technology", ["tech"])
        .check(Check::at_least(value, 0.0))
}

/// `region, period, group_name` keyed bound over a technology group.
fn group_period_bound(name: &str, value: &str) -> TableDef {
    input(name)
        .column(text("region"))
        .column(integer("period"))
        .column(text("group_name"))
        .column(real(value))
        .column(units())
        .column(notes())
        .primary_key(["region", "period", "group_name"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["group_name"], "TechGroup", ["group_name"])
        .check(Check::at_least(value, 0.0))
}

/// Share of a group that one technology may (or must) take.
fn share_bound(name: &str, value: &str) -> TableDef {
    input(name)
        .column(text("region"))
        .column(integer("period"))
        .column(text("tech"))
        .column(text("group_name"))
        .column(real(value))
        .column(notes())
        .primary_key(["region", "period", "tech", "group_name"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["tech"], "Technology", ["tech"])
        .references(["group_name"], "TechGroup", ["group_name"])
        .check(Check::fraction(value))
}

/// `region, tech` keyed parameter.
fn tech_parameter(name: &str, value: &str, check: fn(&str) -> Check) -> TableDef {
    input(name)
        .column(text("region"))
        .column(text("tech"))
        .column(real(value))
        .column(notes())
        .primary_key(["region", "tech"])
        .references(["tech"], "Technology", ["tech"])
        .check(check(value))
}

fn positive(column: &str) -> Check {
    Check::greater_than(column, 0.0)
}

fn non_negative(column: &str) -> Check {
    Check::at_least(column, 0.0)
}

fn fraction(column: &str) -> Check {
    Check::fraction(column)
}

/// Version marker and global scalars.
pub fn metadata_tables() -> Vec<TableDef> {
    vec![
        TableDef::new("MetaData", TableRole::Metadata)
            .column(text("element"))
            .column(integer("value").optional())
            .column(notes())
            .primary_key(["element"]),
        TableDef::new("MetaDataReal", TableRole::Metadata)
            .column(text("element"))
            .column(real("value").optional())
            .column(notes())
            .primary_key(["element"]),
    ]
}

/// Fixed label sets.
pub fn lookup_tables() -> Vec<TableDef> {
    vec![
        TableDef::new("SectorLabel", TableRole::Lookup)
            .column(text("sector"))
            .primary_key(["sector"]),
        lookup("CommodityType"),
        lookup("TechnologyType"),
        lookup("TimePeriodType"),
    ]
}

/// Periods, seasons, times of day and their fractions of a year.
pub fn temporal_tables() -> Vec<TableDef> {
    vec![
        input("TimePeriod")
            .column(integer("sequence"))
            .column(integer("period"))
            .column(text("flag"))
            .primary_key(["period"])
            .unique(["sequence"])
            .references(["flag"], "TimePeriodType", ["label"]),
        input("TimeSeason")
            .column(integer("sequence"))
            .column(text("season"))
            .column(notes())
            .primary_key(["season"])
            .unique(["sequence"]),
        input("TimeOfDay")
            .column(integer("sequence"))
            .column(text("tod"))
            .primary_key(["tod"])
            .unique(["sequence"]),
        input("TimeSegmentFraction")
            .column(text("season"))
            .column(text("tod"))
            .column(real("segfrac"))
            .column(notes())
            .primary_key(["season", "tod"])
            .references(["season"], "TimeSeason", ["season"])
            .references(["tod"], "TimeOfDay", ["tod"])
            .check(fraction("segfrac")),
    ]
}

/// Regions, commodities, technologies and technology groups.
pub fn topology_tables() -> Vec<TableDef> {
    let mut technology = input("Technology")
        .column(text("tech"))
        .column(text("flag"))
        .column(text("sector").optional())
        .column(text("category").optional())
        .column(text("sub_category").optional());
    for name in ["annual", "reserve", "curtail", "retire", "flex", "variable", "exchange"] {
        technology = technology.column(flag_column(name)).check(Check::flag(name));
    }
    let technology = technology
        .column(text("description").optional())
        .primary_key(["tech"])
        .references(["flag"], "TechnologyType", ["label"])
        .references(["sector"], "SectorLabel", ["sector"]);

    vec![
        input("Region")
            .column(text("region"))
            .column(notes())
            .primary_key(["region"]),
        input("Commodity")
            .column(text("name"))
            .column(text("flag"))
            .column(text("description").optional())
            .primary_key(["name"])
            .references(["flag"], "CommodityType", ["label"]),
        technology,
        input("TechGroup")
            .column(text("group_name"))
            .column(notes())
            .primary_key(["group_name"]),
        input("TechGroupMember")
            .column(text("group_name"))
            .column(text("tech"))
            .primary_key(["group_name", "tech"])
            .references(["group_name"], "TechGroup", ["group_name"])
            .references(["tech"], "Technology", ["tech"]),
    ]
}

/// Process definitions: efficiencies, emissions, existing stock and demand.
pub fn process_tables() -> Vec<TableDef> {
    let process_key = ["region", "input_comm", "tech", "vintage", "output_comm"];
    vec![
        input("Efficiency")
            .column(text("region"))
            .column(text("input_comm"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(text("output_comm"))
            .column(real("efficiency"))
            .column(notes())
            .primary_key(process_key)
            .references(["input_comm"], "Commodity", ["name"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
            .references(["output_comm"], "Commodity", ["name"])
            .check(positive("efficiency")),
        input("EmissionActivity")
            .column(text("region"))
            .column(text("emis_comm"))
            .column(text("input_comm"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(text("output_comm"))
            .column(real("activity"))
            .column(units())
            .column(notes())
            .primary_key(["region", "emis_comm", "input_comm", "tech", "vintage", "output_comm"])
            .references(["emis_comm"], "Commodity", ["name"])
            .references(process_key, "Efficiency", process_key),
        input("ExistingCapacity")
            .column(text("region"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(real("capacity"))
            .column(units())
            .column(notes())
            .primary_key(["region", "tech", "vintage"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
            .check(non_negative("capacity")),
        tech_parameter("CapacityToActivity", "c2a", positive),
        tech_parameter("StorageDuration", "duration", positive),
        input("Demand")
            .column(text("region"))
            .column(integer("period"))
            .column(text("commodity"))
            .column(real("demand"))
            .column(units())
            .column(notes())
            .primary_key(["region", "period", "commodity"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["commodity"], "Commodity", ["name"])
            .check(non_negative("demand")),
        input("DemandSpecificDistribution")
            .column(text("region"))
            .column(text("season"))
            .column(text("tod"))
            .column(text("demand_name"))
            .column(real("dds"))
            .column(notes())
            .primary_key(["region", "season", "tod", "demand_name"])
            .references(["season"], "TimeSeason", ["season"])
            .references(["tod"], "TimeOfDay", ["tod"])
            .references(["demand_name"], "Commodity", ["name"])
            .check(fraction("dds")),
    ]
}

/// Costs, loans and lifetimes.
pub fn economic_tables() -> Vec<TableDef> {
    let period_cost = |name: &str| {
        input(name)
            .column(text("region"))
            .column(integer("period"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(real("cost"))
            .column(units())
            .column(notes())
            .primary_key(["region", "period", "tech", "vintage"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
    };

    vec![
        period_cost("CostFixed"),
        period_cost("CostVariable"),
        input("CostInvest")
            .column(text("region"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(real("cost"))
            .column(units())
            .column(notes())
            .primary_key(["region", "tech", "vintage"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"]),
        input("CostEmission")
            .column(text("region"))
            .column(integer("period"))
            .column(text("emis_comm"))
            .column(real("cost"))
            .column(units())
            .column(notes())
            .primary_key(["region", "period", "emis_comm"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["emis_comm"], "Commodity", ["name"]),
        input("LoanRate")
            .column(text("region"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(real("rate"))
            .column(notes())
            .primary_key(["region", "tech", "vintage"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
            .check(non_negative("rate")),
        tech_parameter("LoanLifetimeTech", "lifetime", positive),
        tech_parameter("LifetimeTech", "lifetime", positive),
        input("LifetimeProcess")
            .column(text("region"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(real("lifetime"))
            .column(notes())
            .primary_key(["region", "tech", "vintage"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
            .check(positive("lifetime")),
    ]
}

/// Bounds, shares, growth, splits, factors and policy limits.
pub fn constraint_tables() -> Vec<TableDef> {
    let mut tables = vec![
        tech_period_bound("MaxActivity", "max_act"),
        tech_period_bound("MinActivity", "min_act"),
        group_period_bound("MaxActivityGroup", "max_act"),
        group_period_bound("MinActivityGroup", "min_act"),
        share_bound("MaxActivityShare", "max_proportion"),
        share_bound("MinActivityShare", "min_proportion"),
        tech_period_bound("MaxCapacity", "max_cap"),
        tech_period_bound("MinCapacity", "min_cap"),
        group_period_bound("MaxCapacityGroup", "max_cap"),
        group_period_bound("MinCapacityGroup", "min_cap"),
        share_bound("MaxCapacityShare", "max_proportion"),
        share_bound("MinCapacityShare", "min_proportion"),
        tech_period_bound("MaxNewCapacity", "max_cap"),
        tech_period_bound("MinNewCapacity", "min_cap"),
        group_period_bound("MaxNewCapacityGroup", "max_new_cap"),
        group_period_bound("MinNewCapacityGroup", "min_new_cap"),
        share_bound("MaxNewCapacityShare", "max_proportion"),
        share_bound("MinNewCapacityShare", "min_proportion"),
        tech_parameter("GrowthRateMax", "rate", non_negative),
        tech_parameter("GrowthRateSeed", "seed", non_negative),
        tech_parameter("RampUp", "rate", fraction),
        tech_parameter("RampDown", "rate", fraction),
    ];

    for name in ["TechInputSplit", "TechInputSplitAverage"] {
        tables.push(
            input(name)
                .column(text("region"))
                .column(integer("period"))
                .column(text("input_comm"))
                .column(text("tech"))
                .column(real("min_proportion"))
                .column(notes())
                .primary_key(["region", "period", "input_comm", "tech"])
                .references(["period"], "TimePeriod", ["period"])
                .references(["input_comm"], "Commodity", ["name"])
                .references(["tech"], "Technology", ["tech"])
                .check(fraction("min_proportion")),
        );
    }

    tables.extend([
        input("TechOutputSplit")
            .column(text("region"))
            .column(integer("period"))
            .column(text("tech"))
            .column(text("output_comm"))
            .column(real("min_proportion"))
            .column(notes())
            .primary_key(["region", "period", "tech", "output_comm"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["tech"], "Technology", ["tech"])
            .references(["output_comm"], "Commodity", ["name"])
            .check(fraction("min_proportion")),
        input("CapacityFactorProcess")
            .column(text("region"))
            .column(text("season"))
            .column(text("tod"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(real("factor"))
            .column(notes())
            .primary_key(["region", "season", "tod", "tech", "vintage"])
            .references(["season"], "TimeSeason", ["season"])
            .references(["tod"], "TimeOfDay", ["tod"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
            .check(fraction("factor")),
        input("CapacityFactorTech")
            .column(text("region"))
            .column(text("season"))
            .column(text("tod"))
            .column(text("tech"))
            .column(real("factor"))
            .column(notes())
            .primary_key(["region", "season", "tod", "tech"])
            .references(["season"], "TimeSeason", ["season"])
            .references(["tod"], "TimeOfDay", ["tod"])
            .references(["tech"], "Technology", ["tech"])
            .check(fraction("factor")),
        input("CapacityCredit")
            .column(text("region"))
            .column(integer("period"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(real("credit"))
            .column(notes())
            .primary_key(["region", "period", "tech", "vintage"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
            .check(fraction("credit")),
        input("PlanningReserveMargin")
            .column(text("region"))
            .column(real("margin"))
            .primary_key(["region"])
            .references(["region"], "Region", ["region"])
            .check(non_negative("margin")),
        input("RPSRequirement")
            .column(text("region"))
            .column(integer("period"))
            .column(text("tech_group"))
            .column(real("requirement"))
            .column(notes())
            .primary_key(["region", "period", "tech_group"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["tech_group"], "TechGroup", ["group_name"])
            .check(fraction("requirement")),
        input("EmissionLimit")
            .column(text("region"))
            .column(integer("period"))
            .column(text("emis_comm"))
            .column(real("value"))
            .column(units())
            .column(notes())
            .primary_key(["region", "period", "emis_comm"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["emis_comm"], "Commodity", ["name"]),
        input("LinkedTech")
            .column(text("primary_region"))
            .column(text("primary_tech"))
            .column(text("emis_comm"))
            .column(text("driven_tech"))
            .column(notes())
            .primary_key(["primary_region", "primary_tech", "emis_comm"])
            .references(["emis_comm"], "Commodity", ["name"])
            .link("linked_technologies", ["primary_tech", "driven_tech"], "Technology", "tech"),
        tech_parameter("MaxResource", "max_res", non_negative),
        input("StorageInit")
            .column(text("tech"))
            .column(real("value"))
            .column(notes())
            .primary_key(["tech"])
            .references(["tech"], "Technology", ["tech"])
            .check(fraction("value")),
    ]);

    for name in ["MaxAnnualCapacityFactor", "MinAnnualCapacityFactor"] {
        tables.push(
            input(name)
                .column(text("region"))
                .column(integer("period"))
                .column(text("tech"))
                .column(text("output_comm"))
                .column(real("factor"))
                .column(notes())
                .primary_key(["region", "period", "tech", "output_comm"])
                .references(["period"], "TimePeriod", ["period"])
                .references(["tech"], "Technology", ["tech"])
                .references(["output_comm"], "Commodity", ["name"])
                .check(fraction("factor")),
        );
    }

    tables
}

fn capacity_output(name: &str, with_period: bool) -> TableDef {
    let mut table = output(name)
        .column(text("region"))
        .column(text("sector").optional());
    if with_period {
        table = table.column(integer("period"));
    }
    table = table
        .column(text("tech"))
        .column(integer("vintage"))
        .column(real("capacity"));
    let key: Vec<&str> = if with_period {
        vec![SCENARIO_COLUMN, "region", "period", "tech", "vintage"]
    } else {
        vec![SCENARIO_COLUMN, "region", "tech", "vintage"]
    };
    if with_period {
        table = table.references(["period"], "TimePeriod", ["period"]);
    }
    table
        .primary_key(key)
        .references(["sector"], "SectorLabel", ["sector"])
        .references(["tech"], "Technology", ["tech"])
        .references(["vintage"], "TimePeriod", ["period"])
}

fn flow_output(name: &str, value: &str) -> TableDef {
    output(name)
        .column(text("region"))
        .column(text("sector").optional())
        .column(integer("period"))
        .column(text("season"))
        .column(text("tod"))
        .column(text("input_comm"))
        .column(text("tech"))
        .column(integer("vintage"))
        .column(text("output_comm"))
        .column(real(value))
        .primary_key([
            SCENARIO_COLUMN,
            "region",
            "period",
            "season",
            "tod",
            "input_comm",
            "tech",
            "vintage",
            "output_comm",
        ])
        .references(["sector"], "SectorLabel", ["sector"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["season"], "TimeSeason", ["season"])
        .references(["tod"], "TimeOfDay", ["tod"])
        .references(["input_comm"], "Commodity", ["name"])
        .references(["tech"], "Technology", ["tech"])
        .references(["vintage"], "TimePeriod", ["period"])
        .references(["output_comm"], "Commodity", ["name"])
}

/// The wide cost output of the baseline: one row per process with a column
/// per cost kind, discounted (`d_*`) and undiscounted.
pub const LEGACY_COST_COLUMNS: &[(&str, &str, bool)] = &[
    ("d_invest", "invest", true),
    ("d_fixed", "fixed", true),
    ("d_var", "variable", true),
    ("d_emiss", "emission", true),
    ("invest", "invest", false),
    ("fixed", "fixed", false),
    ("var", "variable", false),
    ("emiss", "emission", false),
];

/// Solver outputs as the baseline shipped them.
pub fn baseline_output_tables() -> Vec<TableDef> {
    let mut legacy_cost = output("OutputCost")
        .column(text("region"))
        .column(integer("period"))
        .column(text("tech"))
        .column(integer("vintage"));
    for (column, _, _) in LEGACY_COST_COLUMNS {
        legacy_cost = legacy_cost.column(real(column).optional());
    }
    let legacy_cost = legacy_cost
        .primary_key([SCENARIO_COLUMN, "region", "period", "tech", "vintage"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["tech"], "Technology", ["tech"])
        .references(["vintage"], "TimePeriod", ["period"]);

    vec![
        output("OutputObjective")
            .column(text("objective_name"))
            .column(real("total_system_cost"))
            .primary_key([SCENARIO_COLUMN, "objective_name"]),
        capacity_output("OutputBuiltCapacity", false),
        capacity_output("OutputNetCapacity", true),
        capacity_output("OutputRetiredCapacity", true),
        flow_output("OutputFlowIn", "flow"),
        flow_output("OutputFlowOut", "flow"),
        flow_output("OutputCurtailment", "curtailment"),
        output("OutputDualVariable")
            .column(text("constraint_name"))
            .column(real("dual"))
            .primary_key([SCENARIO_COLUMN, "constraint_name"]),
        legacy_cost,
        legacy_emission_output(),
        output("OutputFlowOutSummary")
            .column(text("region"))
            .column(text("sector").optional())
            .column(integer("period"))
            .column(text("input_comm"))
            .column(text("tech"))
            .column(integer("vintage"))
            .column(text("output_comm"))
            .column(real("flow"))
            .primary_key([
                SCENARIO_COLUMN,
                "region",
                "period",
                "input_comm",
                "tech",
                "vintage",
                "output_comm",
            ])
            .references(["sector"], "SectorLabel", ["sector"])
            .references(["period"], "TimePeriod", ["period"])
            .references(["input_comm"], "Commodity", ["name"])
            .references(["tech"], "Technology", ["tech"])
            .references(["vintage"], "TimePeriod", ["period"])
            .references(["output_comm"], "Commodity", ["name"]),
        // One row per parameter perturbation of a sensitivity run.
        output("OutputMCDelta")
            .column(integer("run"))
            .column(text("param"))
            .column(text("param_index"))
            .column(real("old_val").optional())
            .column(real("new_val").optional())
            .primary_key([SCENARIO_COLUMN, "run", "param", "param_index"]),
    ]
}

/// Working copy of `Efficiency` rebuilt by myopic runs at each base year.
/// `base_year` is `-1` for processes that existed before the first window.
pub fn myopic_efficiency() -> TableDef {
    input("MyopicEfficiency")
        .column(integer("base_year"))
        .column(text("region"))
        .column(text("input_comm"))
        .column(text("tech"))
        .column(integer("vintage"))
        .column(text("output_comm"))
        .column(real("efficiency"))
        .column(integer("lifetime"))
        .primary_key(["region", "input_comm", "tech", "vintage", "output_comm"])
        .references(["input_comm"], "Commodity", ["name"])
        .references(["tech"], "Technology", ["tech"])
        .references(["output_comm"], "Commodity", ["name"])
        .check(positive("efficiency"))
        .check(positive("lifetime"))
}

/// The baseline emission output: no primary key, and `emis_comm` wrongly
/// pointing at `Technology(tech)`.
pub fn legacy_emission_output() -> TableDef {
    output("Output_Emissions")
        .column(text("region"))
        .column(text("sector").optional())
        .column(integer("period"))
        .column(text("emis_comm"))
        .column(text("tech"))
        .column(integer("vintage"))
        .column(real("emission"))
        .references(["sector"], "SectorLabel", ["sector"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["emis_comm"], "Technology", ["tech"])
        .references(["tech"], "Technology", ["tech"])
        .references(["vintage"], "TimePeriod", ["period"])
}

/// Keyed emission output with `emis_comm` referencing `Commodity(name)`.
pub fn emission_output() -> TableDef {
    output("OutputEmission")
        .column(text("region"))
        .column(text("sector").optional())
        .column(integer("period"))
        .column(text("emis_comm"))
        .column(text("tech"))
        .column(integer("vintage"))
        .column(real("emission"))
        .primary_key([SCENARIO_COLUMN, "region", "period", "emis_comm", "tech", "vintage"])
        .references(["sector"], "SectorLabel", ["sector"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["emis_comm"], "Commodity", ["name"])
        .references(["tech"], "Technology", ["tech"])
        .references(["vintage"], "TimePeriod", ["period"])
}

/// Cost kinds of the long-format cost output.
pub const COST_KINDS: &[&str] = &["invest", "fixed", "variable", "emission"];

/// Long-format cost output: one row per process, cost kind and discounting.
pub fn cost_output() -> TableDef {
    output("Output_Costs_2")
        .column(text("region"))
        .column(text("sector").optional())
        .column(integer("period"))
        .column(text("tech"))
        .column(integer("vintage"))
        .column(text("cost_kind"))
        .column(integer("discounted"))
        .column(real("cost"))
        .primary_key([
            SCENARIO_COLUMN,
            "region",
            "period",
            "tech",
            "vintage",
            "cost_kind",
            "discounted",
        ])
        .references(["sector"], "SectorLabel", ["sector"])
        .references(["period"], "TimePeriod", ["period"])
        .references(["tech"], "Technology", ["tech"])
        .references(["vintage"], "TimePeriod", ["period"])
        .check(Check::OneOf {
            column: "cost_kind".into(),
            allowed: COST_KINDS.iter().map(|k| Value::from(*k)).collect(),
        })
        .check(Check::flag("discounted"))
}

/// Every table of the baseline, in creation order.
pub fn baseline_tables() -> Vec<TableDef> {
    let mut tables = metadata_tables();
    tables.extend(lookup_tables());
    tables.extend(temporal_tables());
    tables.extend(topology_tables());
    tables.extend(process_tables());
    tables.extend(economic_tables());
    tables.extend(constraint_tables());
    tables.push(myopic_efficiency());
    tables.extend(baseline_output_tables());
    tables
}

/// Seed rows of the baseline, as `(table, row)`.
pub fn baseline_seeds() -> Vec<(String, Row)> {
    let mut seeds = Vec::new();
    for sector in SECTOR_LABELS {
        seeds.push(("SectorLabel".to_string(), Row::new().with("sector", *sector)));
    }
    let labelled = [
        ("CommodityType", COMMODITY_TYPES),
        ("TechnologyType", TECHNOLOGY_TYPES),
        ("TimePeriodType", TIME_PERIOD_TYPES),
    ];
    for (table, labels) in labelled {
        for (label, description) in labels {
            seeds.push((
                table.to_string(),
                Row::new().with("label", *label).with("description", *description),
            ));
        }
    }
    seeds.push((
        "MetaData".to_string(),
        Row::new()
            .with("element", MYOPIC_BASE_YEAR)
            .with("value", 2000)
            .with("notes", "base year for myopic analysis"),
    ));
    seeds.push((
        "MetaDataReal".to_string(),
        Row::new()
            .with("element", GLOBAL_DISCOUNT_RATE)
            .with("value", 0.05)
            .with("notes", "discount rate applied to all periods"),
    ));
    seeds.push((
        "MetaDataReal".to_string(),
        Row::new()
            .with("element", DEFAULT_LOAN_RATE)
            .with("value", 0.05)
            .with("notes", "loan rate when LoanRate has no entry"),
    ));
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_tables_validate() {
        for table in baseline_tables() {
            table.validate().unwrap_or_else(|e| panic!("{}: {e}", table.name));
        }
    }

    #[test]
    fn test_every_output_table_is_keyed_by_scenario_first() {
        for table in baseline_tables()
            .into_iter()
            .chain([emission_output(), cost_output()])
            .filter(|t| t.role == TableRole::Output)
        {
            assert_eq!(table.columns[0].name, SCENARIO_COLUMN, "{}", table.name);
            if !table.primary_key.is_empty() {
                assert_eq!(table.primary_key[0], SCENARIO_COLUMN, "{}", table.name);
            }
        }
    }

    #[test]
    fn test_legacy_emission_output_has_no_key() {
        let table = legacy_emission_output();
        assert!(table.primary_key.is_empty());
        let emis = table
            .foreign_keys
            .iter()
            .find(|fk| fk.columns == ["emis_comm"])
            .unwrap();
        assert_eq!(emis.ref_table, "Technology");
        assert_eq!(emission_output().foreign_keys[2].ref_table, "Commodity");
    }

    #[test]
    fn test_linked_tech_declares_link_rule() {
        let linked = constraint_tables()
            .into_iter()
            .find(|t| t.name == "LinkedTech")
            .unwrap();
        assert_eq!(linked.links.len(), 1);
        assert_eq!(linked.links[0].columns, ["primary_tech", "driven_tech"]);
    }

    #[test]
    fn test_capacity_factor_bounds_are_fractions() {
        let tables = constraint_tables();
        for name in ["MaxAnnualCapacityFactor", "MinAnnualCapacityFactor"] {
            let table = tables.iter().find(|t| t.name == name).unwrap();
            assert_eq!(table.primary_key, ["region", "period", "tech", "output_comm"]);
            assert_eq!(table.checks, vec![Check::fraction("factor")]);
        }
        assert!(tables.iter().any(|t| t.name == "MaxResource"));
        assert!(tables.iter().any(|t| t.name == "StorageInit"));
    }

    #[test]
    fn test_optional_outputs_in_baseline() {
        let names: Vec<String> = baseline_tables().into_iter().map(|t| t.name).collect();
        for name in ["OutputFlowOutSummary", "OutputMCDelta", "MyopicEfficiency"] {
            assert!(names.iter().any(|n| n == name), "{name}");
        }
    }

    #[test]
    fn test_seeds_cover_lookups() {
        let seeds = baseline_seeds();
        let sectors = seeds.iter().filter(|(t, _)| t == "SectorLabel").count();
        assert_eq!(sectors, SECTOR_LABELS.len());
        assert!(seeds.iter().any(|(t, row)| {
            t == "MetaDataReal" && row.value("element") == &Value::from(GLOBAL_DISCOUNT_RATE)
        }));
    }
}
