//! Record and dot-path helpers.
//!
//! A record is a schemaless JSON object. Field locations are identified by
//! canonical dot-joined paths (`a.b.c`) which stay stable across records;
//! the relational column name for a path replaces dots with underscores.

use serde_json::{Map, Value};

/// A single ingested record.
pub type Record = Map<String, Value>;

/// Identity fields required in every backend so cross-store joins work.
///
/// `t_stamp` is optional and source-supplied; it is linked only when the
/// source actually sends it.
pub const LINKING_FIELDS: [&str; 3] = ["username", "sys_ingested_at", "t_stamp"];

/// The identity field every record must carry.
pub const IDENTITY_FIELD: &str = "username";

/// The system-stamped ingestion timestamp field.
pub const INGESTED_AT_FIELD: &str = "sys_ingested_at";

/// Returns `true` if the path is one of the linking fields.
pub fn is_linking(path: &str) -> bool {
    LINKING_FIELDS.contains(&path)
}

/// Returns `true` for internal keys, which are skipped by analysis.
pub fn is_internal(key: &str) -> bool {
    key.starts_with('_')
}

/// Relational column name for a dot path.
pub fn column_name(path: &str) -> String {
    path.replace('.', "_")
}

/// Nesting depth of a path: its number of dots.
pub fn nesting_depth(path: &str) -> usize {
    path.matches('.').count()
}

/// Joins a prefix and a key into a dot path.
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_name_rewrites_dots() {
        assert_eq!(column_name("metadata.sensor.v"), "metadata_sensor_v");
        assert_eq!(column_name("username"), "username");
    }

    #[test]
    fn nesting_depth_counts_dots() {
        assert_eq!(nesting_depth("username"), 0);
        assert_eq!(nesting_depth("metadata.sensor.v"), 2);
    }

    #[test]
    fn join_path_handles_empty_prefix() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a", "b"), "a.b");
    }

    #[test]
    fn linking_fields() {
        assert!(is_linking("username"));
        assert!(is_linking("sys_ingested_at"));
        assert!(is_linking("t_stamp"));
        assert!(!is_linking("steps"));
    }

    #[test]
    fn internal_keys_are_underscored() {
        assert!(is_internal("_coercion_metadata"));
        assert!(!is_internal("username"));
    }
}
