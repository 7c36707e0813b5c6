//! Error types for catalog, registry and configuration operations.

use thiserror::Error;

use crate::version::{SchemaVersion, display_version};

/// Errors raised while building catalogs or resolving migration paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A table name was referenced that the catalog does not declare.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A table was declared twice in the same catalog.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),

    /// A column name was referenced that the table does not declare.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    /// A column was declared twice in the same table.
    #[error("duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    /// Table or column name is not a plain SQL identifier.
    #[error("invalid identifier '{0}': must be alphanumeric or underscore and not start with a digit")]
    InvalidIdentifier(String),

    /// No registered step produces the requested version.
    #[error("unknown schema version: {0}")]
    UnknownVersion(SchemaVersion),

    /// No contiguous chain of steps leads from `from` to `to`.
    #[error("no migration path from {} to {to}", display_version(.from))]
    MigrationGap {
        from: Option<SchemaVersion>,
        to: SchemaVersion,
    },

    /// A step was appended that does not follow the registry's last step.
    #[error("migration step {} -> {to} is out of order (registry ends at {})", display_version(.from), display_version(.last))]
    OutOfOrderStep {
        from: Option<SchemaVersion>,
        to: SchemaVersion,
        last: Option<SchemaVersion>,
    },
}

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Convenience alias for results with [`CatalogError`].
pub type Result<T> = std::result::Result<T, CatalogError>;
