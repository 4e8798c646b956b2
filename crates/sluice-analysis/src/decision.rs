//! Placement decisions and classification policy knobs.

use std::fmt;

use serde::{Deserialize, Serialize};

use sluice_core::CanonicalType;
use sluice_core::record::column_name;

/// Which store a path is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Relational store only.
    Sql,
    /// Document store only.
    Doc,
    /// Both stores (linking fields and explicit duplication).
    Both,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sql => "sql",
            Backend::Doc => "doc",
            Backend::Both => "both",
        }
    }

    /// Returns `true` if the path has a relational column.
    pub fn is_relational(&self) -> bool {
        matches!(self, Backend::Sql | Backend::Both)
    }

    /// Returns `true` if the path lives in the document store.
    pub fn is_document(&self) -> bool {
        matches!(self, Backend::Doc | Backend::Both)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy knobs for the rule cascade. Constant for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationThresholds {
    /// Minimum share of records a field must appear in to be relational.
    pub min_presence_ratio: f64,
    /// Minimum share of observations agreeing on the dominant type.
    pub min_type_stability: f64,
    /// Uniqueness ratio above which a field is considered unique.
    pub max_unique_ratio: f64,
    /// Lifetime records after which decisions are considered settled.
    /// Carried with the policy set; the cascade itself is ratio-driven.
    pub min_records_for_decision: u64,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        ClassificationThresholds {
            min_presence_ratio: 0.7,
            min_type_stability: 0.9,
            max_unique_ratio: 0.95,
            min_records_for_decision: 50,
        }
    }
}

/// Routing and physical typing for one canonical path.
///
/// The serialized field names are the persisted metadata layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementDecision {
    #[serde(rename = "field_name")]
    pub path: String,
    pub backend: Backend,
    #[serde(rename = "sql_type")]
    pub relational_type: Option<String>,
    #[serde(rename = "sql_column_name")]
    pub relational_column: String,
    #[serde(rename = "mongo_path")]
    pub document_path: String,
    pub canonical_type: CanonicalType,
    pub is_nullable: bool,
    pub is_unique: bool,
    pub is_primary_key: bool,
    pub reason: String,
}

impl PlacementDecision {
    /// Builds a decision for the given path and backend; the relational
    /// type is filled in for relational backends.
    pub fn new(
        path: &str,
        backend: Backend,
        canonical_type: CanonicalType,
        reason: impl Into<String>,
    ) -> Self {
        let relational_type = backend
            .is_relational()
            .then(|| canonical_type.relational_type().to_string());
        PlacementDecision {
            path: path.to_string(),
            backend,
            relational_type,
            relational_column: column_name(path),
            document_path: path.to_string(),
            canonical_type,
            is_nullable: true,
            is_unique: false,
            is_primary_key: false,
            reason: reason.into(),
        }
    }

    /// Rewrites the canonical type (after a widening), refreshing the
    /// relational type for relational backends.
    pub fn widen_to(&mut self, canonical: CanonicalType, reason: impl Into<String>) {
        self.canonical_type = canonical;
        if self.backend.is_relational() {
            self.relational_type = Some(canonical.relational_type().to_string());
        }
        self.reason = reason.into();
    }
}
