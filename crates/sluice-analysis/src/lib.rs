//! Field analysis and placement classification for the sluice pipeline.
//!
//! [`analyzer`] accumulates per-path statistics over flushed batches,
//! [`classifier`] turns those statistics into placement decisions, and
//! [`widening`] holds the type-widening lattice and conflict detection
//! between new evidence and previously persisted decisions.

pub mod analyzer;
pub mod classifier;
pub mod decision;
pub mod stats;
pub mod widening;

pub use analyzer::FieldAnalyzer;
pub use classifier::Classifier;
pub use decision::{Backend, ClassificationThresholds, PlacementDecision};
pub use stats::{FieldStats, FieldStatsSnapshot, TypeCounts};
pub use widening::{TypeConflict, WideningAction, detect_conflicts, resolve};
