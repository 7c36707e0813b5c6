//! Schema-as-data for capacity-expansion scenario stores.
//!
//! This crate describes a scenario store without touching one:
//!
//! - [`TableDef`] and friends declare tables as data: typed columns, primary
//!   keys, unique sets, foreign keys, value [`Check`]s and [`LinkRule`]s.
//! - [`Catalog`] is the ordered set of tables of one [`SchemaVersion`].
//! - [`MigrationStep`]s describe each version change as [`Action`]s, and the
//!   [`Registry`] orders them, resolves pending chains and folds them into the
//!   catalog of any version.
//! - [`validate_row`] performs the row-local part of constraint enforcement.
//! - [`StoreConfig`] loads the YAML configuration, including opaque solver
//!   options.
//!
//! The SQLite crate turns these definitions into DDL, enforces them against a
//! connection and runs the migrations.
//!
//! # Example
//!
//! ```
//! use scenario_db_core::*;
//!
//! let registry = Registry::standard();
//! let catalog = registry.current_schema().unwrap();
//!
//! let technology = catalog.table("Technology").unwrap();
//! assert!(technology.has_column("unlim_cap"));
//!
//! let row = with_defaults(technology, &Row::new().with("tech", "PLANT").with("flag", "p"));
//! assert!(validate_row(technology, &row).is_ok());
//! ```

mod catalog;
mod config;
pub mod entities;
mod error;
pub mod history;
mod migration;
mod table;
mod validate;
mod value;
mod version;

pub use catalog::Catalog;
pub use config::{SolverOptions, StoreConfig};
pub use error::{CatalogError, ConfigError, Result};
pub use migration::{Action, MigrationStep, Registry};
pub use table::{Check, ColumnDef, ColumnType, ForeignKey, LinkRule, TableDef, TableRole, validate_identifier};
pub use validate::{
    ConstraintViolation, ViolationKind, validate_checks, validate_columns, validate_row, with_defaults,
};
pub use value::{Row, Value};
pub use version::{MAJOR_ELEMENT, MINOR_ELEMENT, SchemaVersion, display_version};
