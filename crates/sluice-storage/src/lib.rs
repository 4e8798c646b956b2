//! Storage backends for the sluice pipeline.
//!
//! The pipeline talks to its two stores through the narrow traits in
//! [`traits`]; the embedded reference drivers ([`sqlite`] for the
//! relational side, [`docfile`] for the document side) implement them for
//! local and test use. Production drivers for external servers plug in
//! behind the same traits.

pub mod docfile;
pub mod error;
pub mod sqlite;
pub mod traits;

pub use docfile::DocFileStore;
pub use error::{Result, StorageError};
pub use sqlite::SqliteRelational;
pub use traits::{ColumnSpec, Document, DocumentStore, RelationalStore, TableSpec};
