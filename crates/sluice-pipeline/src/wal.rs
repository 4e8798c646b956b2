//! Write-ahead log: an append-only line-delimited journal of normalized
//! records awaiting a successful flush.
//!
//! Every record is appended (and synced) before it enters the in-memory
//! batch; the file is unlinked only after metadata persistence, so a crash
//! at any point leaves the unflushed batch recoverable.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;

use tracing::{debug, warn};

use sluice_core::jsonl;
use sluice_core::record::Record;

use crate::error::Result;

/// The write-ahead log at a fixed path.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
}

impl Wal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Wal { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Appends one record as a JSON line and syncs it to disk.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        serde_json::to_writer(&mut file, record)?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }

    /// Replays the journal into a batch.
    ///
    /// A corrupt journal logs a warning and yields an empty batch; losing
    /// the tail is preferable to refusing to start.
    pub fn replay(&self) -> Vec<Record> {
        if !self.path.exists() {
            return Vec::new();
        }
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "write-ahead log unreadable, starting empty");
                return Vec::new();
            }
        };
        let mut records = Vec::new();
        for item in jsonl::read_jsonl::<_, Record>(BufReader::new(file)) {
            match item {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = ?self.path, error = %e, "write-ahead log corrupt, starting empty");
                    return Vec::new();
                }
            }
        }
        debug!(records = records.len(), "replayed write-ahead log");
        records
    }

    /// Number of journaled records.
    pub fn record_count(&self) -> u64 {
        self.replay().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.path.metadata().map(|m| m.len() == 0).unwrap_or(true)
    }

    /// Unlinks the journal after a successful flush.
    pub fn truncate(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!(path = ?self.path, "truncated write-ahead log");
        }
        Ok(())
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
    fn append_then_replay() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::new(dir.path().join("wal.log"));
        assert!(wal.is_empty());

        wal.append(&record(json!({"username": "a", "steps": 1}))).unwrap();
        wal.append(&record(json!({"username": "b", "steps": 2}))).unwrap();

        assert!(!wal.is_empty());
        let records = wal.replay();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["username"], json!("b"));
    }

    #[test]
    fn truncate_unlinks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::new(dir.path().join("wal.log"));
        wal.append(&record(json!({"username": "a"}))).unwrap();
        wal.truncate().unwrap();
        assert!(wal.is_empty());
        assert!(!wal.path().exists());
        assert!(wal.replay().is_empty());
    }

    #[test]
    fn corrupt_journal_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(&path, "{\"username\":\"a\"}\nnot json at all\n").unwrap();

        let wal = Wal::new(&path);
        assert!(wal.replay().is_empty());
    }

    #[test]
    fn missing_file_replays_empty() {
        let wal = Wal::new("/nonexistent/wal.log");
        assert!(wal.replay().is_empty());
        assert!(wal.is_empty());
    }
}
