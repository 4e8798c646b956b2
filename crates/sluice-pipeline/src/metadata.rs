//! Metadata persistence: decisions, statistics and lifetime counters.
//!
//! Three JSON files under the metadata directory. Each write goes through
//! a temporary file and a rename so a torn write cannot corrupt state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use sluice_analysis::{FieldStats, FieldStatsSnapshot, PlacementDecision};

use crate::error::Result;

const DECISIONS_FILE: &str = "decisions.json";
const STATS_FILE: &str = "field_stats.json";
const STATE_FILE: &str = "state.json";

/// Lifetime counters, persisted in `state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub total_records: u64,
    pub last_flush: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Persists pipeline metadata under a directory.
#[derive(Debug)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MetadataStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns `true` when persisted state from a prior run is present.
    pub fn exists(&self) -> bool {
        self.dir.join(STATE_FILE).exists()
    }

    /// Loads decisions, statistics and state from disk.
    pub fn load(
        &self,
    ) -> Result<(
        BTreeMap<String, PlacementDecision>,
        BTreeMap<String, FieldStats>,
        PipelineState,
    )> {
        let decisions: BTreeMap<String, PlacementDecision> =
            read_json_or_default(&self.dir.join(DECISIONS_FILE))?;
        let snapshots: BTreeMap<String, FieldStatsSnapshot> =
            read_json_or_default(&self.dir.join(STATS_FILE))?;
        let state: PipelineState = read_json_or_default(&self.dir.join(STATE_FILE))?;

        let stats = snapshots
            .into_iter()
            .map(|(path, snap)| (path, FieldStats::from(snap)))
            .collect();
        info!(
            dir = ?self.dir,
            total_records = state.total_records,
            decisions = decisions.len(),
            "loaded pipeline metadata"
        );
        Ok((decisions, stats, state))
    }

    /// Persists decisions, statistics and state.
    pub fn save_all(
        &self,
        decisions: &BTreeMap<String, PlacementDecision>,
        stats: &BTreeMap<String, FieldStats>,
        state: &PipelineState,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let snapshots: BTreeMap<&String, FieldStatsSnapshot> = stats
            .iter()
            .map(|(path, field)| (path, FieldStatsSnapshot::from(field)))
            .collect();

        write_json(&self.dir.join(DECISIONS_FILE), decisions)?;
        write_json(&self.dir.join(STATS_FILE), &snapshots)?;
        write_json(&self.dir.join(STATE_FILE), state)?;
        debug!(dir = ?self.dir, version = state.version, "persisted pipeline metadata");
        Ok(())
    }

    /// Deletes all three files.
    pub fn clear(&self) -> Result<()> {
        for file in [DECISIONS_FILE, STATS_FILE, STATE_FILE] {
            let path = self.dir.join(file);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sluice_analysis::Backend;
    use sluice_core::CanonicalType;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        assert!(!store.exists());

        let mut decisions = BTreeMap::new();
        decisions.insert(
            "steps".to_string(),
            PlacementDecision::new("steps", Backend::Sql, CanonicalType::Int, "stable int"),
        );

        let mut stats = BTreeMap::new();
        let mut field = FieldStats::new("steps");
        for i in 0..5 {
            field.observe(&json!(i), CanonicalType::Int);
        }
        stats.insert("steps".to_string(), field);

        let state = PipelineState {
            total_records: 5,
            last_flush: Some(Utc::now()),
            version: 1,
        };

        store.save_all(&decisions, &stats, &state).unwrap();
        assert!(store.exists());

        let (decisions2, stats2, state2) = store.load().unwrap();
        assert_eq!(decisions2["steps"].backend, Backend::Sql);
        assert_eq!(decisions2["steps"].canonical_type, CanonicalType::Int);
        assert_eq!(stats2["steps"].presence_count, 5);
        assert_eq!(stats2["steps"].unique_count(), 5);
        assert_eq!(state2.total_records, 5);
        assert_eq!(state2.version, 1);
    }

    #[test]
    fn persisted_layout_uses_spec_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());

        let mut decisions = BTreeMap::new();
        decisions.insert(
            "metadata.sensor.v".to_string(),
            PlacementDecision::new(
                "metadata.sensor.v",
                Backend::Sql,
                CanonicalType::Str,
                "stable str",
            ),
        );
        store
            .save_all(&decisions, &BTreeMap::new(), &PipelineState::default())
            .unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("decisions.json")).unwrap(),
        )
        .unwrap();
        let entry = &raw["metadata.sensor.v"];
        assert_eq!(entry["field_name"], "metadata.sensor.v");
        assert_eq!(entry["sql_column_name"], "metadata_sensor_v");
        assert_eq!(entry["mongo_path"], "metadata.sensor.v");
        assert_eq!(entry["sql_type"], "VARCHAR(255)");

        let raw: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("state.json")).unwrap(),
        )
        .unwrap();
        assert!(raw.get("total_records").is_some());
        assert!(raw.get("version").is_some());
    }

    #[test]
    fn clear_removes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        store
            .save_all(&BTreeMap::new(), &BTreeMap::new(), &PipelineState::default())
            .unwrap();
        assert!(store.exists());
        store.clear().unwrap();
        assert!(!store.exists());
        assert!(!dir.path().join("decisions.json").exists());
    }

    #[test]
    fn missing_files_load_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        let (decisions, stats, state) = store.load().unwrap();
        assert!(decisions.is_empty());
        assert!(stats.is_empty());
        assert_eq!(state.total_records, 0);
    }
}
