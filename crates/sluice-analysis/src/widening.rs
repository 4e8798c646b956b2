//! The type-widening lattice and conflict detection.
//!
//! The lattice is data, not code: a static table of `(from, to)` pairs
//! that can be reviewed and tested in isolation. `null` widens into
//! anything and every scalar widens into `str`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sluice_core::CanonicalType;

use crate::decision::{Backend, PlacementDecision};
use crate::stats::FieldStats;

/// Safe widenings. A conversion along any of these pairs preserves the
/// stored values.
pub const WIDENINGS: &[(CanonicalType, CanonicalType)] = &[
    (CanonicalType::Bool, CanonicalType::Int),
    (CanonicalType::Bool, CanonicalType::Float),
    (CanonicalType::Bool, CanonicalType::Str),
    (CanonicalType::Int, CanonicalType::Float),
    (CanonicalType::Int, CanonicalType::Str),
    (CanonicalType::Float, CanonicalType::Str),
    (CanonicalType::Ip, CanonicalType::Str),
    (CanonicalType::Uuid, CanonicalType::Str),
    (CanonicalType::DateTime, CanonicalType::Str),
];

/// Returns `true` if `(from, to)` is in the widening table.
pub fn can_widen(from: CanonicalType, to: CanonicalType) -> bool {
    WIDENINGS.contains(&(from, to))
}

/// How a type conflict on a relationally-stored path is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideningAction {
    /// No action required (same type, or incoming null).
    NoOp,
    /// Widen the stored column to the given type and rewrite rows.
    Widen(CanonicalType),
    /// The stored type already accommodates the incoming values.
    AlreadyWide,
    /// Structured values arrived on a relational scalar: the path must
    /// move to the document store.
    MigrateToDocument,
}

/// Resolves a conflict between a stored canonical type and the incoming
/// dominant type, for a path with a relational column.
pub fn resolve(stored: CanonicalType, incoming: CanonicalType) -> WideningAction {
    if stored == incoming || incoming == CanonicalType::Null {
        return WideningAction::NoOp;
    }
    if stored == CanonicalType::Null {
        // Nothing but nulls was stored; adopting the incoming type
        // rewrites no rows.
        return WideningAction::Widen(incoming);
    }
    if can_widen(stored, incoming) {
        return WideningAction::Widen(incoming);
    }
    if can_widen(incoming, stored) {
        return WideningAction::AlreadyWide;
    }
    if matches!(incoming, CanonicalType::Array | CanonicalType::Object) {
        return WideningAction::MigrateToDocument;
    }
    // Incompatible scalars (uuid arriving on int, ...): both sides widen
    // into str.
    WideningAction::Widen(CanonicalType::Str)
}

/// Detected drift between accumulated evidence and a stored decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeConflict {
    pub path: String,
    pub stored_type: CanonicalType,
    pub incoming_type: CanonicalType,
    pub stored_backend: Backend,
    pub can_widen: bool,
    pub widened_type: Option<CanonicalType>,
    pub reason: String,
}

/// Compares new statistics against previously persisted decisions and
/// emits one conflict per drifted path.
pub fn detect_conflicts(
    stats: &BTreeMap<String, FieldStats>,
    decisions: &BTreeMap<String, PlacementDecision>,
) -> Vec<TypeConflict> {
    let mut conflicts = Vec::new();
    for (path, decision) in decisions {
        let Some(field) = stats.get(path) else {
            continue;
        };
        let incoming = field.dominant_type();
        let stored = decision.canonical_type;
        if incoming == stored || incoming == CanonicalType::Null {
            continue;
        }

        let action = resolve(stored, incoming);
        let (widenable, widened, reason) = match action {
            WideningAction::NoOp => continue,
            WideningAction::Widen(to) => (
                can_widen(stored, incoming) || stored == CanonicalType::Null,
                Some(to),
                format!("{stored} widens to {to}"),
            ),
            WideningAction::AlreadyWide => (
                false,
                None,
                format!("stored {stored} already accommodates {incoming}"),
            ),
            WideningAction::MigrateToDocument => (
                false,
                None,
                format!("{incoming} cannot live in a {stored} column, moving to documents"),
            ),
        };

        conflicts.push(TypeConflict {
            path: path.clone(),
            stored_type: stored,
            incoming_type: incoming,
            stored_backend: decision.backend,
            can_widen: widenable,
            widened_type: widened,
            reason,
        });
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_covers_every_scalar_to_str() {
        for ct in [
            CanonicalType::Bool,
            CanonicalType::Int,
            CanonicalType::Float,
            CanonicalType::Ip,
            CanonicalType::Uuid,
            CanonicalType::DateTime,
        ] {
            assert!(can_widen(ct, CanonicalType::Str), "{ct} should widen to str");
        }
    }

    #[test]
    fn narrowing_is_never_in_the_table() {
        assert!(!can_widen(CanonicalType::Str, CanonicalType::Int));
        assert!(!can_widen(CanonicalType::Float, CanonicalType::Int));
        assert!(!can_widen(CanonicalType::Str, CanonicalType::Bool));
    }

    #[test]
    fn arrays_and_objects_never_widen() {
        for ct in [CanonicalType::Array, CanonicalType::Object] {
            assert!(!can_widen(ct, CanonicalType::Str));
            assert!(!can_widen(CanonicalType::Str, ct));
        }
    }

    #[test]
    fn resolve_widens_int_to_str() {
        assert_eq!(
            resolve(CanonicalType::Int, CanonicalType::Str),
            WideningAction::Widen(CanonicalType::Str)
        );
    }

    #[test]
    fn resolve_keeps_wide_columns() {
        // Ints arriving on an already-widened str column need nothing.
        assert_eq!(
            resolve(CanonicalType::Str, CanonicalType::Int),
            WideningAction::AlreadyWide
        );
        assert_eq!(
            resolve(CanonicalType::Float, CanonicalType::Int),
            WideningAction::AlreadyWide
        );
    }

    #[test]
    fn resolve_moves_structured_values_to_documents() {
        assert_eq!(
            resolve(CanonicalType::Int, CanonicalType::Array),
            WideningAction::MigrateToDocument
        );
        assert_eq!(
            resolve(CanonicalType::Str, CanonicalType::Object),
            WideningAction::MigrateToDocument
        );
    }

    #[test]
    fn resolve_null_transitions_are_free() {
        assert_eq!(resolve(CanonicalType::Int, CanonicalType::Null), WideningAction::NoOp);
        assert_eq!(
            resolve(CanonicalType::Null, CanonicalType::Int),
            WideningAction::Widen(CanonicalType::Int)
        );
    }

    #[test]
    fn resolve_incompatible_scalars_meet_at_str() {
        assert_eq!(
            resolve(CanonicalType::Int, CanonicalType::Uuid),
            WideningAction::Widen(CanonicalType::Str)
        );
    }

    #[test]
    fn detects_drift_against_stored_decisions() {
        let mut stats = BTreeMap::new();
        let mut zip = FieldStats::new("zip");
        for s in ["90210-1234", "10001-0001"] {
            zip.observe(&json!(s), CanonicalType::Str);
        }
        stats.insert("zip".to_string(), zip);

        let mut decisions = BTreeMap::new();
        decisions.insert(
            "zip".to_string(),
            PlacementDecision::new("zip", Backend::Sql, CanonicalType::Int, "stable int"),
        );

        let conflicts = detect_conflicts(&stats, &decisions);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.stored_type, CanonicalType::Int);
        assert_eq!(c.incoming_type, CanonicalType::Str);
        assert!(c.can_widen);
        assert_eq!(c.widened_type, Some(CanonicalType::Str));
        assert_eq!(c.stored_backend, Backend::Sql);
    }

    #[test]
    fn agreement_emits_nothing() {
        let mut stats = BTreeMap::new();
        let mut steps = FieldStats::new("steps");
        steps.observe(&json!(1), CanonicalType::Int);
        stats.insert("steps".to_string(), steps);

        let mut decisions = BTreeMap::new();
        decisions.insert(
            "steps".to_string(),
            PlacementDecision::new("steps", Backend::Sql, CanonicalType::Int, "stable int"),
        );

        assert!(detect_conflicts(&stats, &decisions).is_empty());
    }
}
