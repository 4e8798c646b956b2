//! Backend driver traits.
//!
//! The pipeline is single-writer, so mutating operations take `&mut self`
//! and drivers need no internal locking. Values cross the boundary as
//! `serde_json::Value`; each driver converts to its native types.

use serde_json::Value;

use crate::error::Result;

/// A document: one JSON object stored in a collection.
pub type Document = serde_json::Map<String, Value>;

/// One relational column derived from a placement decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub unique: bool,
}

/// Target shape of the relational table for the current decisions.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

/// Narrow interface over the relational store.
pub trait RelationalStore: Send {
    /// Creates the table with every column of the spec, or adds the
    /// columns that are missing from an existing table. Unique columns
    /// get a unique index either way.
    fn ensure_table(&mut self, spec: &TableSpec) -> Result<()>;

    /// Names of the table's columns, excluding the surrogate key.
    /// Empty when the table does not exist.
    fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Changes a column's declared type, preserving row data.
    fn modify_column_type(&mut self, table: &str, column: &str, sql_type: &str) -> Result<()>;

    /// Drops a column.
    fn drop_column(&mut self, table: &str, column: &str) -> Result<()>;

    /// Inserts the row, or updates it when `key_column` is given and a row
    /// with the same key exists. Matching is on the key column only; all
    /// other columns in the row are overwritten.
    fn upsert(&mut self, table: &str, key_column: Option<&str>, row: &Document) -> Result<()>;

    /// Returns `(key, value)` for every row where `column` is non-null.
    fn select_pairs(&self, table: &str, key_column: &str, column: &str)
    -> Result<Vec<(Value, Value)>>;

    /// Sets one column of the row matching `key`.
    fn update_value(
        &mut self,
        table: &str,
        key_column: &str,
        key: &Value,
        column: &str,
        value: &Value,
    ) -> Result<()>;

    fn count_rows(&self, table: &str) -> Result<u64>;

    fn drop_table(&mut self, table: &str) -> Result<()>;
}

/// Narrow interface over the document store.
///
/// Field arguments are dot paths into nested documents.
pub trait DocumentStore: Send {
    /// Drops non-primary indexes, then creates a unique index on the
    /// primary key (when given) and a non-unique index on the ingestion
    /// timestamp.
    fn ensure_indexes(&mut self, collection: &str, primary_key: Option<&str>) -> Result<()>;

    /// Installs a validator requiring the given fields to be present and
    /// string-typed on every inserted document.
    fn set_validator(&mut self, collection: &str, required: &[String]) -> Result<()>;

    /// Inserts a document without deduplication.
    fn insert_one(&mut self, collection: &str, doc: Document) -> Result<()>;

    /// Sets `fields` on the document whose `key_field` equals `key`,
    /// inserting a new document when none matches.
    fn upsert_one(
        &mut self,
        collection: &str,
        key_field: &str,
        key: &Value,
        fields: &Document,
    ) -> Result<()>;

    /// Returns `(key, value)` for every document where `field` is present
    /// and non-null; documents lacking `key_field` are skipped.
    fn field_pairs(&self, collection: &str, key_field: &str, field: &str)
    -> Result<Vec<(Value, Value)>>;

    /// Sets one field on the document matching `key`. Returns whether a
    /// document matched.
    fn set_field_for_key(
        &mut self,
        collection: &str,
        key_field: &str,
        key: &Value,
        field: &str,
        value: &Value,
    ) -> Result<bool>;

    /// Unsets one field on the document matching `key`. Returns whether a
    /// document matched.
    fn unset_field_for_key(
        &mut self,
        collection: &str,
        key_field: &str,
        key: &Value,
        field: &str,
    ) -> Result<bool>;

    /// Unsets a field on every document carrying it. Returns the number of
    /// documents changed.
    fn unset_field_all(&mut self, collection: &str, field: &str) -> Result<u64>;

    fn count_documents(&self, collection: &str) -> Result<u64>;

    fn drop_collection(&mut self, collection: &str) -> Result<()>;

    /// Makes buffered writes durable.
    fn persist(&mut self) -> Result<()>;
}
