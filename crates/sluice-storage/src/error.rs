//! Storage error types.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to establish or maintain a backend connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A schema change (DDL) was rejected. Aborts the flush that issued it.
    #[error("schema change on {table} failed: {reason}")]
    Schema {
        /// The table or collection being evolved.
        table: String,
        /// Underlying error description.
        reason: String,
    },

    /// A document violated the collection validator.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// A unique index rejected a duplicate value.
    #[error("duplicate value for unique field '{field}'")]
    DuplicateKey {
        /// The indexed field.
        field: String,
    },

    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "table", "collection").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error from the document store's files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StorageError::Schema`] for the given table.
    pub fn schema(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`StorageError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if the error is a schema-evolution failure, which
    /// aborts the surrounding flush rather than being skipped per-row.
    pub fn is_schema_failure(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}
