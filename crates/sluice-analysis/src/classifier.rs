//! The rule cascade turning statistics into placement decisions.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use sluice_core::CanonicalType;
use sluice_core::record::is_linking;

use crate::decision::{Backend, ClassificationThresholds, PlacementDecision};
use crate::stats::FieldStats;

/// Name fragments that mark identifier-like fields. Matched on delimited
/// path segments so `humidity` does not read as an id.
static ID_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|[._])(id|uuid|guid|key)([._]|$)").unwrap());

/// Name fragments that mark timestamp-like fields.
static TIMESTAMP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(time|date|timestamp|_at|created|updated|ingested)").unwrap());

/// Minimum presence ratio for a primary-key candidate.
const PK_MIN_PRESENCE: f64 = 0.9;

/// Minimum uniqueness ratio for a primary-key candidate.
const PK_MIN_UNIQUE: f64 = 0.9;

/// Returns `true` if the path name contains an id marker.
pub fn has_id_marker(path: &str) -> bool {
    ID_MARKER.is_match(path)
}

/// Returns `true` if the path name looks timestamp-like.
pub fn is_timestamp_like(path: &str) -> bool {
    TIMESTAMP_MARKER.is_match(path)
}

/// A scored primary-key candidate.
#[derive(Debug, Clone)]
struct PkCandidate {
    path: String,
    score: f64,
    unique_ratio: f64,
}

/// Applies the deterministic rule cascade over accumulated statistics.
#[derive(Debug, Default)]
pub struct Classifier {
    thresholds: ClassificationThresholds,
}

impl Classifier {
    pub fn new(thresholds: ClassificationThresholds) -> Self {
        Classifier { thresholds }
    }

    pub fn thresholds(&self) -> &ClassificationThresholds {
        &self.thresholds
    }

    /// Produces one decision per observed path. The primary-key post-pass
    /// is separate ([`Classifier::select_primary_key`]) so the orchestrator
    /// can run it after merging with previously stored decisions.
    pub fn classify_all(
        &self,
        stats: &BTreeMap<String, FieldStats>,
        total_records: u64,
    ) -> BTreeMap<String, PlacementDecision> {
        stats
            .iter()
            .map(|(path, field)| (path.clone(), self.classify_field(field, total_records)))
            .collect()
    }

    /// The rule cascade for one field, in order: linking, array, object,
    /// stable scalar, document fallback.
    fn classify_field(&self, field: &FieldStats, total_records: u64) -> PlacementDecision {
        let t = &self.thresholds;
        let dominant = field.dominant_type();
        let presence = field.presence_ratio(total_records);
        let nullable = field.null_count > 0 || presence < 1.0;

        if is_linking(&field.path) {
            let mut decision = PlacementDecision::new(
                &field.path,
                Backend::Both,
                dominant,
                "linking field kept in both backends",
            );
            decision.relational_type = Some("VARCHAR(255)".to_string());
            decision.is_nullable = false;
            decision.is_unique =
                field.unique_ratio() > t.max_unique_ratio && !is_timestamp_like(&field.path);
            return decision;
        }

        if dominant == CanonicalType::Array {
            let mut decision = PlacementDecision::new(
                &field.path,
                Backend::Doc,
                dominant,
                "arrays stay in the document store",
            );
            decision.is_nullable = nullable;
            return decision;
        }

        if dominant == CanonicalType::Object {
            let mut decision = PlacementDecision::new(
                &field.path,
                Backend::Doc,
                dominant,
                "objects stay in the document store",
            );
            decision.is_nullable = nullable;
            return decision;
        }

        let stability = field.type_stability();
        if dominant.is_scalar() && presence >= t.min_presence_ratio && stability >= t.min_type_stability
        {
            let mut decision = PlacementDecision::new(
                &field.path,
                Backend::Sql,
                dominant,
                format!(
                    "stable {dominant} present in {:.0}% of records",
                    presence * 100.0
                ),
            );
            decision.is_unique =
                has_id_marker(&field.path) && field.unique_ratio() > t.max_unique_ratio;
            decision.is_nullable = nullable;
            return decision;
        }

        let reason = if !dominant.is_scalar() {
            "no scalar evidence yet".to_string()
        } else if presence < t.min_presence_ratio {
            format!("sparse field ({:.0}% presence)", presence * 100.0)
        } else {
            format!("unstable type mix (stability {:.2})", stability)
        };
        let mut decision = PlacementDecision::new(&field.path, Backend::Doc, dominant, reason);
        decision.is_nullable = nullable;
        decision
    }

    /// Primary-key post-pass over relational decisions.
    ///
    /// Skips arrays, objects, datetimes and timestamp-like names; a
    /// candidate qualifies at presence ≥ 0.9 and uniqueness ≥ 0.9 and is
    /// scored `0.6·unique + 0.3·presence + 0.1·id-marker`, ties broken by
    /// uniqueness. Returns `None` when nothing qualifies; the relational
    /// store's surrogate key then carries bootstrap inserts.
    pub fn select_primary_key(
        &self,
        decisions: &mut BTreeMap<String, PlacementDecision>,
        stats: &BTreeMap<String, FieldStats>,
        total_records: u64,
    ) -> Option<String> {
        let mut best: Option<PkCandidate> = None;

        for (path, decision) in decisions.iter() {
            if !decision.backend.is_relational() {
                continue;
            }
            if matches!(
                decision.canonical_type,
                CanonicalType::Array | CanonicalType::Object | CanonicalType::DateTime
            ) {
                continue;
            }
            if is_timestamp_like(path) {
                continue;
            }
            let Some(field) = stats.get(path) else {
                continue;
            };

            let presence = field.presence_ratio(total_records);
            let unique = field.unique_ratio();
            if presence < PK_MIN_PRESENCE || unique < PK_MIN_UNIQUE {
                continue;
            }

            let marker_bonus = if has_id_marker(path) { 0.1 } else { 0.0 };
            let score = 0.6 * unique + 0.3 * presence + marker_bonus;
            debug!(path = %path, score, unique, presence, "primary key candidate");

            let better = match &best {
                None => true,
                Some(current) => {
                    score > current.score
                        || (score == current.score && unique > current.unique_ratio)
                }
            };
            if better {
                best = Some(PkCandidate {
                    path: path.clone(),
                    score,
                    unique_ratio: unique,
                });
            }
        }

        let winner = best?;
        let decision = decisions
            .get_mut(&winner.path)
            .expect("candidate came from the decision map");
        decision.is_primary_key = true;
        decision.is_unique = true;
        decision.is_nullable = false;
        Some(winner.path)
    }
}
