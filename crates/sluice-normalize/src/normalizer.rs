//! Record normalization.
//!
//! Normalization validates the identity field, coerces stringified scalar
//! leaves to their true types while preserving object/array structure, and
//! stamps the ingestion timestamp. The coercion report is returned beside
//! the record rather than embedded in it, so normalizing an
//! already-normalized record changes nothing but the timestamp.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use sluice_core::CanonicalType;
use sluice_core::record::{IDENTITY_FIELD, INGESTED_AT_FIELD, Record, join_path};

use crate::detector::coerce_str;

/// Errors produced during normalization.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// A required identity field is missing, null or empty.
    #[error("required identity field '{field}' is missing or empty")]
    MissingIdentity {
        /// The identity field that was absent.
        field: String,
    },
}

/// Result alias for normalization.
pub type Result<T> = std::result::Result<T, NormalizeError>;

/// One successful string-to-scalar coercion.
#[derive(Debug, Clone)]
pub struct CoercionEntry {
    pub field: String,
    pub from: CanonicalType,
    pub to: CanonicalType,
}

/// One coercion that matched a type but could not be represented.
#[derive(Debug, Clone)]
pub struct CoercionFailure {
    pub field: String,
    pub attempted: CanonicalType,
}

/// What happened to string leaves while normalizing one record.
#[derive(Debug, Clone, Default)]
pub struct CoercionReport {
    pub coerced: Vec<CoercionEntry>,
    pub failed: Vec<CoercionFailure>,
}

/// A normalized record together with its coercion report.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub record: Record,
    pub report: CoercionReport,
}

/// Walks raw records into canonical ones.
#[derive(Debug, Default)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        RecordNormalizer
    }

    /// Normalizes a single raw record.
    ///
    /// Fails with [`NormalizeError::MissingIdentity`] when `username` is
    /// absent, null or empty; such records must not be buffered.
    pub fn normalize(&self, raw: &Record) -> Result<NormalizedRecord> {
        validate_identity(raw)?;

        let mut report = CoercionReport::default();
        let mut record = Record::new();
        for (key, value) in raw {
            let normalized = normalize_value(value, key, &mut report);
            record.insert(key.clone(), normalized);
        }

        // Stamped last so re-normalization overwrites rather than nests.
        record.insert(
            INGESTED_AT_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );

        for failure in &report.failed {
            debug!(
                field = %failure.field,
                attempted = %failure.attempted,
                "coercion failed, keeping string"
            );
        }

        Ok(NormalizedRecord { record, report })
    }

    /// Normalizes a batch, rejecting individual records without aborting.
    pub fn normalize_batch(&self, raws: &[Record]) -> Vec<Result<NormalizedRecord>> {
        raws.iter().map(|r| self.normalize(r)).collect()
    }
}

fn validate_identity(record: &Record) -> Result<()> {
    let ok = match record.get(IDENTITY_FIELD) {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    if ok {
        Ok(())
    } else {
        Err(NormalizeError::MissingIdentity {
            field: IDENTITY_FIELD.to_string(),
        })
    }
}

fn normalize_value(value: &Value, path: &str, report: &mut CoercionReport) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::Object(map) => {
            let mut out = Record::new();
            for (k, v) in map {
                let child = join_path(path, k);
                out.insert(k.clone(), normalize_value(v, &child, report));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let out = items
                .iter()
                .enumerate()
                .map(|(i, item)| normalize_value(item, &format!("{path}[{i}]"), report))
                .collect();
            Value::Array(out)
        }
        Value::String(s) => {
            let coercion = coerce_str(s);
            if coercion.coerced {
                report.coerced.push(CoercionEntry {
                    field: path.to_string(),
                    from: CanonicalType::Str,
                    to: coercion.canonical,
                });
            }
            if let Some(attempted) = coercion.failed {
                report.failed.push(CoercionFailure {
                    field: path.to_string(),
                    attempted,
                });
            }
            coercion.value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn rejects_missing_identity() {
        let n = RecordNormalizer::new();
        for raw in [
            json!({"steps": 100}),
            json!({"username": null, "steps": 100}),
            json!({"username": "", "steps": 100}),
        ] {
            let err = n.normalize(&record(raw)).unwrap_err();
            assert!(matches!(err, NormalizeError::MissingIdentity { .. }));
        }
    }

    #[test]
    fn coerces_stringified_scalars() {
        let n = RecordNormalizer::new();
        let out = n
            .normalize(&record(json!({
                "username": "alice",
                "steps": "9197",
                "temp": "23.5",
                "active": "true",
                "note": "null",
            })))
            .unwrap();

        assert_eq!(out.record["steps"], json!(9197));
        assert_eq!(out.record["temp"], json!(23.5));
        assert_eq!(out.record["active"], json!(true));
        assert_eq!(out.record["note"], json!(null));
        assert_eq!(out.report.coerced.len(), 4);
    }

    #[test]
    fn bool_strings_are_bool_not_int_or_str() {
        let n = RecordNormalizer::new();
        let out = n
            .normalize(&record(json!({"username": "a", "flag": "true", "off": "false"})))
            .unwrap();
        assert_eq!(out.record["flag"], json!(true));
        assert_eq!(out.record["off"], json!(false));
    }

    #[test]
    fn preserves_structure_and_coerces_nested_leaves() {
        let n = RecordNormalizer::new();
        let out = n
            .normalize(&record(json!({
                "username": "bob",
                "metadata": {"sensor": {"v": "2.1", "cal": "false"}},
                "tags": ["1", "x"],
            })))
            .unwrap();

        assert_eq!(out.record["metadata"]["sensor"]["v"], json!(2.1));
        assert_eq!(out.record["metadata"]["sensor"]["cal"], json!(false));
        assert_eq!(out.record["tags"], json!([1, "x"]));
    }

    #[test]
    fn typed_strings_stay_strings() {
        let n = RecordNormalizer::new();
        let out = n
            .normalize(&record(json!({
                "username": "c",
                "ip": "192.168.1.1",
                "session": "44cf4b1f-cfd4-42c1-a55f-62cf0c37f15b",
                "seen": "2026-02-14T05:44:25Z",
            })))
            .unwrap();
        assert_eq!(out.record["ip"], json!("192.168.1.1"));
        assert_eq!(out.record["session"], json!("44cf4b1f-cfd4-42c1-a55f-62cf0c37f15b"));
        assert_eq!(out.record["seen"], json!("2026-02-14T05:44:25Z"));
        assert!(out.report.coerced.is_empty());
    }

    #[test]
    fn stamps_ingestion_timestamp_with_offset() {
        let n = RecordNormalizer::new();
        let out = n.normalize(&record(json!({"username": "a"}))).unwrap();
        let stamp = out.record["sys_ingested_at"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn normalizing_twice_differs_only_in_timestamp() {
        let n = RecordNormalizer::new();
        let first = n
            .normalize(&record(json!({
                "username": "alice",
                "steps": "100",
                "nested": {"x": "yes"},
            })))
            .unwrap();
        let second = n.normalize(&first.record).unwrap();

        let mut a = first.record.clone();
        let mut b = second.record.clone();
        a.remove("sys_ingested_at");
        b.remove("sys_ingested_at");
        assert_eq!(a, b);
    }

    #[test]
    fn records_failed_coercions() {
        let n = RecordNormalizer::new();
        let out = n
            .normalize(&record(json!({"username": "a", "ratio": "inf"})))
            .unwrap();
        assert_eq!(out.record["ratio"], json!("inf"));
        assert_eq!(out.report.failed.len(), 1);
        assert_eq!(out.report.failed[0].field, "ratio");
    }
}
