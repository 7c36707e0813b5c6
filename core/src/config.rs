//! Store configuration.
//!
//! The solver section is carried through opaquely: this crate never
//! interprets backend options, it only stores and hands them back.
//!
//! # Example YAML
//!
//! ```yaml
//! upgrade_on_open: true
//! solver:
//!   workers: 4
//!   backends:
//!     highs:
//!       time_limit: 3600
//!       presolve: "on"
//!     gurobi:
//!       Method: 2
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Options forwarded to an external solver, keyed by backend name.
///
/// # Examples
///
/// ```
/// # use scenario_db_core::SolverOptions;
/// let options: SolverOptions = serde_yaml::from_str(
///     "workers: 2\nbackends:\n  highs:\n    presolve: 'on'\n",
/// )
/// .unwrap();
/// assert_eq!(options.workers, 2);
/// assert!(options.for_backend("highs").is_some());
/// assert!(options.for_backend("cplex").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Number of parallel solver workers.
    pub workers: usize,
    /// Backend name to option map, passed through untouched.
    pub backends: BTreeMap<String, BTreeMap<String, serde_yaml::Value>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            backends: BTreeMap::new(),
        }
    }
}

impl SolverOptions {
    /// Options for one backend, if configured.
    pub fn for_backend(&self, name: &str) -> Option<&BTreeMap<String, serde_yaml::Value>> {
        self.backends.get(name)
    }
}

/// Top-level configuration for opening a store.
///
/// # Examples
///
/// ```no_run
/// use scenario_db_core::StoreConfig;
///
/// let config = StoreConfig::load("scenario-db.yml").unwrap();
/// if !config.upgrade_on_open {
///     println!("store will be opened read-only if it is behind");
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Run pending migrations when a store is opened.
    pub upgrade_on_open: bool,
    pub solver: SolverOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            upgrade_on_open: true,
            solver: SolverOptions::default(),
        }
    }
}

impl StoreConfig {
    /// Loads configuration from a YAML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be read,
    /// or [`YamlError`](ConfigError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be
    /// written, or [`YamlError`](ConfigError::YamlError) if serialization
    /// fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
