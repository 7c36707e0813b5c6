//! Schema version marker.
//!
//! A store records its schema version as two integer rows (`DB_MAJOR`,
//! `DB_MINOR`) in the `MetaData` table. A store without those rows (a fresh,
//! empty file) is *unversioned*, which callers model as
//! `Option<SchemaVersion>::None`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `MetaData.element` value holding the major version.
pub const MAJOR_ELEMENT: &str = "DB_MAJOR";

/// `MetaData.element` value holding the minor version.
pub const MINOR_ELEMENT: &str = "DB_MINOR";

/// A `(major, minor)` schema version.
///
/// Versions order lexicographically, so `3.10` is newer than `3.9`.
///
/// # Examples
///
/// ```
/// use scenario_db_core::SchemaVersion;
///
/// let v = SchemaVersion::new(3, 1);
/// assert!(v > SchemaVersion::new(3, 0));
/// assert_eq!(v.to_string(), "3.1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Formats an optional version, rendering `None` as `unversioned`.
pub fn display_version(version: &Option<SchemaVersion>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "unversioned".to_string(),
    }
}
