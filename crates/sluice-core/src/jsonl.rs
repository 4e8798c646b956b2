//! JSONL (JSON Lines) read/write support.
//!
//! Each line is a complete JSON document. Used by the write-ahead log and
//! by the embedded document store's on-disk collections.

use std::io::{self, BufRead, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Result alias for JSONL operations.
pub type Result<T> = std::result::Result<T, JsonlError>;

/// Writes items as JSONL to the given writer.
///
/// Each item is written as a single JSON line followed by a newline.
pub fn write_jsonl<W: Write, T: Serialize>(writer: &mut W, items: &[T]) -> Result<()> {
    for item in items {
        serde_json::to_writer(&mut *writer, item)
            .map_err(|e| JsonlError::Json { line: 0, source: e })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Returns an iterator that reads items from a JSONL reader.
///
/// Each line is parsed as a JSON document. Empty lines are skipped.
pub fn read_jsonl<R: BufRead, T: DeserializeOwned>(reader: R) -> JsonlIter<R, T> {
    JsonlIter {
        reader,
        line_number: 0,
        _marker: std::marker::PhantomData,
    }
}

/// Iterator over JSONL-encoded items.
pub struct JsonlIter<R, T> {
    reader: R,
    line_number: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<R: BufRead, T: DeserializeOwned> Iterator for JsonlIter<R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue; // skip empty lines
                    }
                    match serde_json::from_str::<T>(trimmed) {
                        Ok(item) => return Some(Ok(item)),
                        Err(e) => {
                            return Some(Err(JsonlError::Json {
                                line: self.line_number,
                                source: e,
                            }));
                        }
                    }
                }
                Err(e) => return Some(Err(JsonlError::Io(e))),
            }
        }
    }
}
