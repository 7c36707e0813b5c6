//! SQLite backend for energy-system scenario stores.
//!
//! This crate turns the table catalog of
//! [`scenario_db_core`] into a live SQLite database. It creates and upgrades
//! stores through the registered migration steps, validates every write
//! against the catalog's constraints, and partitions solver outputs by
//! scenario name.
//!
//! # Architecture
//!
//! - **`schema`**: DDL generation and on-disk shape inspection
//! - **`convert`**: mapping between catalog rows and SQL rows
//! - **`enforce`**: the constraint enforcer used by every write
//! - **`migration`**: version marker handling and transactional upgrades
//! - **`store`**: the [`Store`] facade for inputs, outputs and scalars
//!
//! # Quick start
//!
//! ```no_run
//! use rusqlite::Connection;
//! use scenario_db_core::Row;
//! use scenario_db_sqlite::{Migrator, Store};
//!
//! // Bring an existing file up to date and report what ran.
//! let conn = Connection::open("utopia.sqlite").unwrap();
//! let report = Migrator::new(&conn).upgrade_with_report().unwrap();
//! for step in &report.applied {
//!     println!("applied {step}");
//! }
//! drop(conn);
//!
//! let mut store = Store::open("utopia.sqlite").unwrap();
//! store
//!     .write_scenario(
//!         "base",
//!         [(
//!             "OutputEmission",
//!             Row::new()
//!                 .with("region", "R1")
//!                 .with("period", 2020)
//!                 .with("emis_comm", "co2")
//!                 .with("tech", "E01")
//!                 .with("vintage", 2020)
//!                 .with("emission", 12.5),
//!         )],
//!     )
//!     .unwrap();
//! println!("scenarios: {:?}", store.scenarios().unwrap());
//! ```
//!
//! # Versioning
//!
//! The version marker lives in the `MetaData` table as the integer elements
//! `DB_MAJOR` and `DB_MINOR`. A store without a marker and without tables is
//! treated as empty and receives the whole history. A store without a marker
//! but with tables is refused.

mod convert;
mod enforce;
mod error;
mod migration;
pub mod schema;
mod store;

pub use enforce::Enforcer;
pub use error::{Result, StoreError};
pub use migration::{MigrationReport, Migrator, stored_version};
pub use store::{Store, content_digest};
