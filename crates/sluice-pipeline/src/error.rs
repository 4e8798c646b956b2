//! Pipeline error types.

use sluice_normalize::NormalizeError;
use sluice_storage::StorageError;

/// Errors surfaced by the orchestrator and its components.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A record failed normalization and was rejected (not buffered).
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// A backend driver failed. Schema failures abort the flush; other
    /// storage errors are handled per-row where the policy allows.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Another pipeline already owns the metadata directory.
    #[error("metadata directory is locked by another pipeline: {0}")]
    Locked(String),

    /// WAL or metadata file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The ingress source failed.
    #[error(transparent)]
    Source(#[from] crate::source::SourceError),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Returns `true` when the error is a schema-evolution failure, which
    /// keeps the buffer and WAL for a retry.
    pub fn is_schema_failure(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_schema_failure())
    }
}
