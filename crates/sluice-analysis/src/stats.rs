//! Per-path field statistics.

use std::collections::BTreeMap;
use std::collections::HashSet;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sluice_core::CanonicalType;
use sluice_core::record::nesting_depth;

/// Hard cap on the uniqueness set. Values beyond the cap still count
/// toward presence but are not inserted.
pub const UNIQUE_SET_CAP: usize = 1000;

/// Number of sample values kept per path.
pub const SAMPLE_CAP: usize = 5;

/// Fixed-arity observation counts keyed by [`CanonicalType`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCounts([u64; CanonicalType::ALL.len()]);

impl TypeCounts {
    pub fn new() -> Self {
        TypeCounts::default()
    }

    pub fn bump(&mut self, ct: CanonicalType) {
        self.0[ct as usize] += 1;
    }

    pub fn get(&self, ct: CanonicalType) -> u64 {
        self.0[ct as usize]
    }

    /// Sum over all tags.
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// The tag with the highest count; ties break toward declaration
    /// order. `None` when nothing has been observed.
    pub fn dominant(&self) -> Option<(CanonicalType, u64)> {
        let mut best: Option<(CanonicalType, u64)> = None;
        for ct in CanonicalType::ALL {
            let count = self.get(ct);
            if count > 0 && best.is_none_or(|(_, c)| count > c) {
                best = Some((ct, count));
            }
        }
        best
    }

    /// Iterates over tags with non-zero counts.
    pub fn iter(&self) -> impl Iterator<Item = (CanonicalType, u64)> + '_ {
        CanonicalType::ALL
            .into_iter()
            .map(|ct| (ct, self.get(ct)))
            .filter(|(_, c)| *c > 0)
    }
}

impl Serialize for TypeCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (ct, count) in self.iter() {
            map.serialize_entry(ct.as_str(), &count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TypeCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries: BTreeMap<CanonicalType, u64> = BTreeMap::deserialize(deserializer)?;
        let mut counts = TypeCounts::new();
        for (ct, count) in entries {
            counts.0[ct as usize] = count;
        }
        Ok(counts)
    }
}

/// Accumulated evidence about one canonical path.
#[derive(Debug, Clone)]
pub struct FieldStats {
    /// Dot-notation path, stable across records.
    pub path: String,
    /// Number of dots in the path, fixed at creation.
    pub nesting_depth: usize,
    /// Observations of this path across all analyzed records.
    pub presence_count: u64,
    /// Observations per canonical type.
    pub type_counts: TypeCounts,
    /// Null observations (also counted in `type_counts`).
    pub null_count: u64,
    /// Bounded set of distinct scalar values.
    unique_values: HashSet<String>,
    /// Unique count restored from persisted metadata; new values cannot
    /// be deduplicated against it.
    unique_restored: u64,
    /// Observations of unhashable values (arrays/objects) that bypass the
    /// uniqueness set.
    pub unique_count_unhashable: u64,
    /// Up to [`SAMPLE_CAP`] sample values.
    pub sample_values: Vec<Value>,
}

impl FieldStats {
    pub fn new(path: &str) -> Self {
        FieldStats {
            path: path.to_string(),
            nesting_depth: nesting_depth(path),
            presence_count: 0,
            type_counts: TypeCounts::new(),
            null_count: 0,
            unique_values: HashSet::new(),
            unique_restored: 0,
            unique_count_unhashable: 0,
            sample_values: Vec::new(),
        }
    }

    /// Folds one observation into the statistics.
    pub fn observe(&mut self, value: &Value, canonical: CanonicalType) {
        self.presence_count += 1;
        self.type_counts.bump(canonical);

        if canonical == CanonicalType::Null {
            self.null_count += 1;
            return;
        }

        match canonical {
            CanonicalType::Array | CanonicalType::Object => {
                self.unique_count_unhashable += 1;
            }
            _ => {
                if self.unique_values.len() < UNIQUE_SET_CAP {
                    self.unique_values.insert(value.to_string());
                }
            }
        }

        if self.sample_values.len() < SAMPLE_CAP {
            self.sample_values.push(value.clone());
        }
    }

    /// The most frequently observed type; `Null` before any observation.
    pub fn dominant_type(&self) -> CanonicalType {
        self.type_counts
            .dominant()
            .map(|(ct, _)| ct)
            .unwrap_or(CanonicalType::Null)
    }

    /// Share of observations agreeing with the dominant type, in `[0, 1]`.
    pub fn type_stability(&self) -> f64 {
        if self.presence_count == 0 {
            return 0.0;
        }
        self.type_counts.get(self.dominant_type()) as f64 / self.presence_count as f64
    }

    /// Share of analyzed records in which this path appeared.
    pub fn presence_ratio(&self, total_records: u64) -> f64 {
        if total_records == 0 {
            return 0.0;
        }
        self.presence_count as f64 / total_records as f64
    }

    /// Distinct values seen, including the restored base and unhashable
    /// observations.
    pub fn unique_count(&self) -> u64 {
        self.unique_restored + self.unique_values.len() as u64 + self.unique_count_unhashable
    }

    /// Distinct values over non-null observations.
    pub fn unique_ratio(&self) -> f64 {
        let non_null = self.presence_count - self.null_count;
        if non_null == 0 {
            return 0.0;
        }
        self.unique_count() as f64 / non_null as f64
    }

    pub fn is_nested(&self) -> bool {
        self.nesting_depth > 0
    }
}

/// Persisted form of [`FieldStats`]: the uniqueness set is replaced by
/// its count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldStatsSnapshot {
    pub name: String,
    pub nesting_depth: usize,
    pub presence_count: u64,
    pub type_counts: TypeCounts,
    pub null_count: u64,
    pub unique_count: u64,
    pub is_nested: bool,
    pub sample_values: Vec<Value>,
}

impl From<&FieldStats> for FieldStatsSnapshot {
    fn from(stats: &FieldStats) -> Self {
        FieldStatsSnapshot {
            name: stats.path.clone(),
            nesting_depth: stats.nesting_depth,
            presence_count: stats.presence_count,
            type_counts: stats.type_counts.clone(),
            null_count: stats.null_count,
            unique_count: stats.unique_count(),
            is_nested: stats.is_nested(),
            sample_values: stats.sample_values.clone(),
        }
    }
}

impl From<FieldStatsSnapshot> for FieldStats {
    fn from(snap: FieldStatsSnapshot) -> Self {
        FieldStats {
            nesting_depth: snap.nesting_depth,
            presence_count: snap.presence_count,
            type_counts: snap.type_counts,
            null_count: snap.null_count,
            unique_values: HashSet::new(),
            unique_restored: snap.unique_count,
            unique_count_unhashable: 0,
            sample_values: snap.sample_values,
            path: snap.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn presence_equals_type_count_sum() {
        let mut stats = FieldStats::new("steps");
        for v in [json!(1), json!(2), json!("x"), json!(null)] {
            stats.observe(&v, CanonicalType::detect(&v));
        }
        assert_eq!(stats.presence_count, stats.type_counts.total());
        assert_eq!(stats.null_count, 1);
    }

    #[test]
    fn stability_is_one_iff_all_observations_agree() {
        let mut stats = FieldStats::new("steps");
        for i in 0..10 {
            stats.observe(&json!(i), CanonicalType::Int);
        }
        assert_eq!(stats.type_stability(), 1.0);

        stats.observe(&json!("drift"), CanonicalType::Str);
        assert!(stats.type_stability() < 1.0);
        assert!(stats.type_stability() > 0.0);
    }

    #[test]
    fn dominant_type_is_argmax() {
        let mut stats = FieldStats::new("zip");
        for i in 0..6 {
            stats.observe(&json!(i), CanonicalType::Int);
        }
        for s in ["a", "b"] {
            stats.observe(&json!(s), CanonicalType::Str);
        }
        assert_eq!(stats.dominant_type(), CanonicalType::Int);
    }

    #[test]
    fn unique_set_is_bounded() {
        let mut stats = FieldStats::new("v");
        for i in 0..(UNIQUE_SET_CAP as i64 + 500) {
            stats.observe(&json!(i), CanonicalType::Int);
        }
        assert_eq!(stats.unique_count(), UNIQUE_SET_CAP as u64);
        assert_eq!(stats.presence_count, UNIQUE_SET_CAP as u64 + 500);
    }

    #[test]
    fn unhashable_values_bypass_the_set() {
        let mut stats = FieldStats::new("tags");
        stats.observe(&json!(["a"]), CanonicalType::Array);
        stats.observe(&json!({"k": 1}), CanonicalType::Object);
        assert_eq!(stats.unique_count_unhashable, 2);
        assert_eq!(stats.unique_count(), 2);
    }

    #[test]
    fn samples_are_capped() {
        let mut stats = FieldStats::new("v");
        for i in 0..20 {
            stats.observe(&json!(i), CanonicalType::Int);
        }
        assert_eq!(stats.sample_values.len(), SAMPLE_CAP);
    }

    #[test]
    fn unique_ratio_uses_non_null_denominator() {
        let mut stats = FieldStats::new("v");
        for i in 0..8 {
            stats.observe(&json!(i), CanonicalType::Int);
        }
        stats.observe(&json!(null), CanonicalType::Null);
        stats.observe(&json!(null), CanonicalType::Null);
        assert_eq!(stats.unique_ratio(), 1.0);
    }

    #[test]
    fn snapshot_round_trips_up_to_the_set() {
        let mut stats = FieldStats::new("a.b");
        for i in 0..5 {
            stats.observe(&json!(i), CanonicalType::Int);
        }
        let snap = FieldStatsSnapshot::from(&stats);
        let json = serde_json::to_string(&snap).unwrap();
        let back: FieldStatsSnapshot = serde_json::from_str(&json).unwrap();
        let restored = FieldStats::from(back);

        assert_eq!(restored.path, "a.b");
        assert_eq!(restored.nesting_depth, 1);
        assert_eq!(restored.presence_count, 5);
        assert_eq!(restored.unique_count(), 5);
        assert_eq!(restored.type_counts.get(CanonicalType::Int), 5);
    }

    #[test]
    fn type_counts_serialize_sparse() {
        let mut counts = TypeCounts::new();
        counts.bump(CanonicalType::Int);
        counts.bump(CanonicalType::Int);
        counts.bump(CanonicalType::Str);
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json, json!({"int": 2, "str": 1}));
    }
}
