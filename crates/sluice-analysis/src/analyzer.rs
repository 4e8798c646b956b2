//! Batch field analysis.
//!
//! Records are walked depth-first into dot-notation paths. Objects are
//! recursed into without being recorded themselves; arrays of objects are
//! flattened through their first element (representative flattening) and
//! also recorded as arrays; everything else is a leaf observation.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use sluice_core::CanonicalType;
use sluice_core::record::{Record, is_internal, join_path};

use crate::stats::FieldStats;

/// Accumulates [`FieldStats`] across flushed batches.
#[derive(Debug, Clone, Default)]
pub struct FieldAnalyzer {
    stats: BTreeMap<String, FieldStats>,
    total_records: u64,
}

impl FieldAnalyzer {
    pub fn new() -> Self {
        FieldAnalyzer::default()
    }

    /// Restores an analyzer from persisted statistics.
    pub fn from_parts(stats: BTreeMap<String, FieldStats>, total_records: u64) -> Self {
        FieldAnalyzer {
            stats,
            total_records,
        }
    }

    /// Folds a batch into the statistics and bumps the lifetime count.
    pub fn analyze_batch(&mut self, batch: &[Record]) {
        for record in batch {
            self.analyze_record(record);
        }
        debug!(
            records = batch.len(),
            total = self.total_records,
            paths = self.stats.len(),
            "analyzed batch"
        );
    }

    /// Folds a single record into the statistics.
    pub fn analyze_record(&mut self, record: &Record) {
        self.total_records += 1;
        for (key, value) in record {
            if is_internal(key) {
                continue;
            }
            self.walk(key.clone(), value);
        }
    }

    fn walk(&mut self, path: String, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if is_internal(key) {
                        continue;
                    }
                    self.walk(join_path(&path, key), child);
                }
            }
            Value::Array(items) => {
                // Representative flattening: the first object element
                // stands in for the array's structure.
                if let Some(Value::Object(first)) = items.first() {
                    for (key, child) in first {
                        if is_internal(key) {
                            continue;
                        }
                        self.walk(join_path(&path, key), child);
                    }
                }
                self.observe(path, value, CanonicalType::Array);
            }
            _ => {
                let canonical = CanonicalType::detect(value);
                self.observe(path, value, canonical);
            }
        }
    }

    fn observe(&mut self, path: String, value: &Value, canonical: CanonicalType) {
        self.stats
            .entry(path.clone())
            .or_insert_with(|| FieldStats::new(&path))
            .observe(value, canonical);
    }

    pub fn stats(&self) -> &BTreeMap<String, FieldStats> {
        &self.stats
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn flattens_nested_objects_without_recording_them() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.analyze_record(&record(json!({
            "username": "bob",
            "metadata": {"sensor": {"v": 2.1, "cal": false}},
        })));

        assert!(analyzer.stats().contains_key("metadata.sensor.v"));
        assert!(analyzer.stats().contains_key("metadata.sensor.cal"));
        assert!(!analyzer.stats().contains_key("metadata"));
        assert!(!analyzer.stats().contains_key("metadata.sensor"));
    }

    #[test]
    fn arrays_of_objects_flatten_representatively() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.analyze_record(&record(json!({
            "username": "a",
            "readings": [{"v": 1}, {"v": 2, "extra": true}],
        })));

        // The array itself is recorded, and the first element is walked.
        let readings = &analyzer.stats()["readings"];
        assert_eq!(readings.dominant_type(), CanonicalType::Array);
        assert!(analyzer.stats().contains_key("readings.v"));
        // Only the first element is representative.
        assert!(!analyzer.stats().contains_key("readings.extra"));
    }

    #[test]
    fn scalar_arrays_are_leaves() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.analyze_record(&record(json!({"username": "a", "tags": ["x", "y"]})));
        assert_eq!(
            analyzer.stats()["tags"].dominant_type(),
            CanonicalType::Array
        );
        assert!(!analyzer.stats().contains_key("tags.0"));
    }

    #[test]
    fn internal_keys_are_skipped() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.analyze_record(&record(json!({
            "username": "a",
            "_internal": 1,
            "nested": {"_hidden": 2, "seen": 3},
        })));
        assert!(!analyzer.stats().contains_key("_internal"));
        assert!(!analyzer.stats().contains_key("nested._hidden"));
        assert!(analyzer.stats().contains_key("nested.seen"));
    }

    #[test]
    fn total_records_is_monotonic() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.analyze_batch(&[
            record(json!({"username": "a"})),
            record(json!({"username": "b"})),
        ]);
        assert_eq!(analyzer.total_records(), 2);
        analyzer.analyze_batch(&[record(json!({"username": "c"}))]);
        assert_eq!(analyzer.total_records(), 3);
    }

    #[test]
    fn string_shapes_detected_at_leaves() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.analyze_record(&record(json!({
            "username": "c",
            "ip": "192.168.1.1",
            "ratio": 1.234,
        })));
        assert_eq!(analyzer.stats()["ip"].dominant_type(), CanonicalType::Ip);
        assert_eq!(
            analyzer.stats()["ratio"].dominant_type(),
            CanonicalType::Float
        );
    }
}
