//! Ingress sources.
//!
//! The orchestrator polls a [`RecordSource`]; [`HttpSource`] fetches JSON
//! from a stream endpoint and [`JsonlSource`] reads a line-delimited file.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use sluice_core::jsonl::{self, JsonlIter};
use sluice_core::record::Record;

/// Errors from an ingress source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] Box<ureq::Error>),

    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error(transparent)]
    Jsonl(#[from] jsonl::JsonlError),
}

/// Result alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// A stream of raw records.
pub trait RecordSource {
    /// Fetches the next record; `None` when the source is exhausted.
    fn fetch_one(&mut self) -> Result<Option<Record>>;

    /// Fetches up to `n` records.
    fn fetch_many(&mut self, n: usize) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(n);
        while records.len() < n {
            match self.fetch_one()? {
                Some(record) => records.push(record),
                None => break,
            }
        }
        Ok(records)
    }
}

/// Polls a JSON endpoint. An object response yields one record; an array
/// response is queued and drained across calls.
pub struct HttpSource {
    agent: ureq::Agent,
    url: String,
    pending: VecDeque<Record>,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(10)))
            .build();
        HttpSource {
            agent: config.into(),
            url: url.into(),
            pending: VecDeque::new(),
        }
    }

    fn refill(&mut self) -> Result<()> {
        let mut response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(Box::new)?;
        let value: Value = response.body_mut().read_json().map_err(Box::new)?;
        match value {
            Value::Object(record) => self.pending.push_back(record),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(record) => self.pending.push_back(record),
                        other => {
                            return Err(SourceError::UnexpectedPayload(format!(
                                "array element is not an object: {other}"
                            )));
                        }
                    }
                }
            }
            other => {
                return Err(SourceError::UnexpectedPayload(format!(
                    "expected an object or array, got: {other}"
                )));
            }
        }
        debug!(url = %self.url, queued = self.pending.len(), "fetched from stream");
        Ok(())
    }
}

impl RecordSource for HttpSource {
    fn fetch_one(&mut self) -> Result<Option<Record>> {
        if self.pending.is_empty() {
            self.refill()?;
        }
        Ok(self.pending.pop_front())
    }
}

/// Reads records from a JSONL file, one per line.
pub struct JsonlSource {
    iter: JsonlIter<BufReader<File>, Record>,
}

impl JsonlSource {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(JsonlSource {
            iter: jsonl::read_jsonl(BufReader::new(file)),
        })
    }
}

impl RecordSource for JsonlSource {
    fn fetch_one(&mut self) -> Result<Option<Record>> {
        match self.iter.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(SourceError::Jsonl(e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn jsonl_source_drains_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{{\"username\":\"a\"}}").unwrap();
        writeln!(file, "{{\"username\":\"b\"}}").unwrap();
        drop(file);

        let mut source = JsonlSource::open(&path).unwrap();
        let records = source.fetch_many(10).unwrap();
        assert_eq!(records.len(), 2);
        assert!(source.fetch_one().unwrap().is_none());
    }

    #[test]
    fn jsonl_source_surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let mut source = JsonlSource::open(&path).unwrap();
        assert!(source.fetch_one().is_err());
    }
}
