//! Dual-backend record routing.
//!
//! Splits each still-nested record over its outer keys according to the
//! current decisions, ensures the target schemas exist, then upserts into
//! both stores keyed by the discovered primary key.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use sluice_analysis::{Backend, PlacementDecision};
use sluice_core::record::{LINKING_FIELDS, Record, is_internal, is_linking};
use sluice_storage::{ColumnSpec, Document, DocumentStore, RelationalStore, TableSpec};

use crate::error::Result;

/// Outcome of routing one batch.
#[derive(Debug, Clone, Default)]
pub struct RouteResult {
    pub processed: u64,
    pub sql_upserts: u64,
    pub doc_upserts: u64,
    pub errors: Vec<String>,
}

/// Routes batches against the two stores.
pub struct Router<'a> {
    relational: &'a mut dyn RelationalStore,
    document: &'a mut dyn DocumentStore,
    table: &'a str,
    collection: &'a str,
}

impl<'a> Router<'a> {
    pub fn new(
        relational: &'a mut dyn RelationalStore,
        document: &'a mut dyn DocumentStore,
        table: &'a str,
        collection: &'a str,
    ) -> Self {
        Router {
            relational,
            document,
            table,
            collection,
        }
    }

    /// Brings both stores up to the current decisions: relational table
    /// and columns, document indexes and validator.
    pub fn ensure_schema(
        &mut self,
        decisions: &BTreeMap<String, PlacementDecision>,
        primary_key: Option<&str>,
    ) -> Result<()> {
        let columns: Vec<ColumnSpec> = decisions
            .values()
            .filter(|d| d.backend.is_relational())
            .map(|d| ColumnSpec {
                name: d.relational_column.clone(),
                sql_type: d
                    .relational_type
                    .clone()
                    .unwrap_or_else(|| "TEXT".to_string()),
                nullable: d.is_nullable,
                unique: d.is_unique,
            })
            .collect();
        self.relational.ensure_table(&TableSpec {
            name: self.table.to_string(),
            columns,
        })?;

        let indexed_key =
            primary_key.filter(|pk| !sluice_analysis::classifier::is_timestamp_like(pk));
        self.document.ensure_indexes(self.collection, indexed_key)?;

        let mut required = vec![sluice_core::record::INGESTED_AT_FIELD.to_string()];
        if let Some(pk) = indexed_key {
            required.push(pk.to_string());
        }
        self.document.set_validator(self.collection, &required)?;
        Ok(())
    }

    /// Routes a batch. Per-record driver errors are logged, counted and
    /// skipped; they never abort the batch.
    pub fn route_batch(
        &mut self,
        batch: &[Record],
        decisions: &BTreeMap<String, PlacementDecision>,
        primary_key: Option<&str>,
    ) -> RouteResult {
        let mut result = RouteResult::default();

        for record in batch {
            result.processed += 1;
            let (sql_payload, doc_payload) = split_record(record, decisions);

            if !sql_payload.is_empty() {
                let row = relational_row(&sql_payload, decisions);
                let key_column = primary_key
                    .and_then(|pk| decisions.get(pk))
                    .map(|d| d.relational_column.as_str());
                match self.relational.upsert(self.table, key_column, &row) {
                    Ok(()) => result.sql_upserts += 1,
                    Err(e) => {
                        warn!(error = %e, "relational upsert failed");
                        result.errors.push(format!("relational: {e}"));
                    }
                }
            }

            if !doc_payload.is_empty() {
                let key = primary_key
                    .and_then(|pk| get_dot_path(record, pk).map(|value| (pk, value)));
                let outcome = match key {
                    Some((pk, key)) => {
                        self.document.upsert_one(self.collection, pk, key, &doc_payload)
                    }
                    // No discovered key yet: insert without deduplication.
                    None => self.document.insert_one(self.collection, doc_payload),
                };
                match outcome {
                    Ok(()) => result.doc_upserts += 1,
                    Err(e) => {
                        warn!(error = %e, "document upsert failed");
                        result.errors.push(format!("document: {e}"));
                    }
                }
            }
        }

        debug!(
            processed = result.processed,
            sql = result.sql_upserts,
            doc = result.doc_upserts,
            errors = result.errors.len(),
            "routed batch"
        );
        result
    }
}

/// Splits one record over its outer keys into relational and document
/// payloads. Unknown paths default to the document store.
pub fn split_record(
    record: &Record,
    decisions: &BTreeMap<String, PlacementDecision>,
) -> (Record, Document) {
    let mut sql = Record::new();
    let mut doc = Document::new();

    for (key, value) in record {
        if is_internal(key) {
            continue;
        }
        match decisions.get(key).map(|d| d.backend) {
            Some(Backend::Sql) => {
                sql.insert(key.clone(), value.clone());
                // Linking fields ride along into the documents even when
                // classified relational-only.
                if is_linking(key) {
                    doc.insert(key.clone(), value.clone());
                }
            }
            Some(Backend::Both) => {
                sql.insert(key.clone(), value.clone());
                doc.insert(key.clone(), value.clone());
            }
            Some(Backend::Doc) | None => {
                doc.insert(key.clone(), value.clone());
            }
        }
    }

    // A record with relational output must stay joinable: carry the
    // linking fields over when the document side came up empty.
    if !sql.is_empty() && doc.is_empty() {
        for field in LINKING_FIELDS {
            if let Some(value) = record.get(field) {
                doc.insert(field.to_string(), value.clone());
            }
        }
    }

    (sql, doc)
}

/// Builds the relational row, renaming paths to column names.
fn relational_row(
    payload: &Record,
    decisions: &BTreeMap<String, PlacementDecision>,
) -> Document {
    let mut row = Document::new();
    for (path, value) in payload {
        let column = decisions
            .get(path)
            .map(|d| d.relational_column.clone())
            .unwrap_or_else(|| sluice_core::record::column_name(path));
        row.insert(column, value.clone());
    }
    row
}

/// Navigates a dot path into a nested record.
fn get_dot_path<'v>(record: &'v Record, path: &str) -> Option<&'v Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
