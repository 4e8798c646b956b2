//! The sluice pipeline: durability envelope, routing and orchestration.
//!
//! Records flow normalizer → WAL + buffer → analyzer → classifier →
//! conflict detection → migration → schema ensure → dual-backend routing →
//! metadata persistence. [`pipeline::Pipeline`] owns the choreography and
//! its ordering guarantees.

pub mod error;
pub mod metadata;
pub mod migrator;
pub mod pipeline;
pub mod router;
pub mod source;
pub mod wal;

pub use error::{PipelineError, Result};
pub use metadata::{MetadataStore, PipelineState};
pub use migrator::{MigrationKind, MigrationReport, Migrator};
pub use pipeline::{FlushResult, Pipeline, PipelineOptions, PipelineStatus};
pub use router::{RouteResult, Router};
pub use source::{HttpSource, JsonlSource, RecordSource, SourceError};
pub use wal::Wal;
