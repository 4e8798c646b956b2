//! Record normalization for the sluice pipeline.
//!
//! Raw records arrive with most scalars stringified. [`detector`] coerces
//! string leaves to their true types; [`normalizer`] walks whole records,
//! validates identity and stamps the ingestion timestamp.

pub mod detector;
pub mod normalizer;

pub use normalizer::{
    CoercionReport, NormalizeError, NormalizedRecord, RecordNormalizer, Result,
};
