//! Error types for store and migration operations.

use scenario_db_core::{CatalogError, ConfigError, ConstraintViolation, SchemaVersion, display_version};
use thiserror::Error;

/// Errors that can occur while opening, migrating or writing a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Catalog or registry failure, including migration gaps.
    #[error(transparent)]
    CatalogError(#[from] CatalogError),

    /// A row was rejected by the enforcer.
    #[error(transparent)]
    ConstraintError(#[from] ConstraintViolation),

    /// On-disk shape differs from the catalog of the stored version.
    #[error("schema mismatch in {table}: {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// Stored version is newer than the requested target.
    #[error("store is at version {stored}, newer than supported version {supported}")]
    DowngradeUnsupported {
        stored: SchemaVersion,
        supported: SchemaVersion,
    },

    /// A write was attempted on a store that has not been upgraded.
    #[error("store is at version {}, writes require {current}", display_version(.stored))]
    VersionBehind {
        stored: Option<SchemaVersion>,
        current: SchemaVersion,
    },

    /// A migration step failed; the whole upgrade was rolled back.
    #[error("migration step {step} failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<StoreError>,
    },

    /// The version marker rows may only be written by the migration runner.
    #[error("metadata element {0} is reserved for the version marker")]
    ReservedMetadata(String),

    /// A scenario write named a table that is not an output table.
    #[error("{0} is not an output table")]
    NotAnOutputTable(String),

    /// The registry has no steps, so there is nothing to upgrade to.
    #[error("migration registry is empty")]
    EmptyRegistry,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

impl StoreError {
    /// The constraint violation behind this error, looking through
    /// [`StepFailed`](Self::StepFailed).
    pub fn violation(&self) -> Option<&ConstraintViolation> {
        match self {
            StoreError::ConstraintError(v) => Some(v),
            StoreError::StepFailed { source, .. } => source.violation(),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_db_core::ViolationKind;

    fn failing_query() -> Result<i64> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let n = conn.query_row("SELECT count(*) FROM Missing", [], |r| r.get(0))?;
        Ok(n)
    }

    #[test]
    fn test_sqlite_failure_is_database_error() {
        let err = failing_query().unwrap_err();
        assert!(matches!(err, StoreError::DatabaseError(_)));
        assert!(err.to_string().starts_with("database error:"));
        assert!(err.violation().is_none());
    }

    #[test]
    fn test_violation_found_through_step_failure() {
        let violation = ConstraintViolation::new(ViolationKind::Check, "CapacityCredit", "credit", "1.5");
        let err = StoreError::StepFailed {
            step: "3.3 -> 3.4".into(),
            source: Box::new(StoreError::from(violation.clone())),
        };
        let StoreError::StepFailed { source, .. } = &err else {
            panic!("expected StepFailed, got {err:?}");
        };
        assert!(matches!(**source, StoreError::ConstraintError(_)));
        assert_eq!(err.violation(), Some(&violation));
    }

    #[test]
    fn test_catalog_and_config_errors_wrap() {
        let err = StoreError::from(CatalogError::UnknownTable("Nope".into()));
        assert!(matches!(err, StoreError::CatalogError(CatalogError::UnknownTable(_))));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StoreError::from(ConfigError::from(io));
        assert!(matches!(err, StoreError::ConfigError(_)));
    }
}
