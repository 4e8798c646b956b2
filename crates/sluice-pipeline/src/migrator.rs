//! Historical-data migration.
//!
//! Two families: type widenings (rewrite stored values into the widened
//! type) and backend changes (copy-then-remove between the stores). DDL
//! failures abort the surrounding flush; per-row failures are skipped,
//! counted and surfaced.

use serde_json::Value;
use tracing::{info, warn};

use sluice_analysis::{Backend, PlacementDecision};
use sluice_core::CanonicalType;
use sluice_core::record::column_name;
use sluice_storage::{ColumnSpec, DocumentStore, RelationalStore, TableSpec};

use crate::error::Result;

/// What a migration did to one path.
#[derive(Debug, Clone)]
pub enum MigrationKind {
    /// A column was widened from one canonical type to another.
    TypeWidening {
        from: CanonicalType,
        to: CanonicalType,
    },
    /// A path moved between backends.
    BackendChange { from: Backend, to: Backend },
}

/// Outcome of one migration, best-effort per row/document.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub path: String,
    pub kind: MigrationKind,
    pub migrated: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

impl MigrationReport {
    fn new(path: &str, kind: MigrationKind) -> Self {
        MigrationReport {
            path: path.to_string(),
            kind,
            migrated: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }
}

/// Converts a stored value along a widening. `None` means the row is
/// skipped and counted.
pub fn convert_value(value: &Value, target: CanonicalType) -> Option<Value> {
    match target {
        CanonicalType::Str => match value {
            Value::String(_) => Some(value.clone()),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        CanonicalType::Float => match value {
            Value::Bool(b) => serde_json::Number::from_f64(if *b { 1.0 } else { 0.0 })
                .map(Value::Number),
            Value::Number(n) => {
                if n.is_f64() {
                    Some(value.clone())
                } else {
                    n.as_i64()
                        .and_then(|i| serde_json::Number::from_f64(i as f64))
                        .map(Value::Number)
                }
            }
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        CanonicalType::Int => match value {
            Value::Bool(b) => Some(Value::Number((*b as i64).into())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::String(s) => s.parse::<i64>().ok().map(|i| Value::Number(i.into())),
            _ => None,
        },
        // ip/uuid/datetime stay strings; identity conversion only.
        CanonicalType::Ip | CanonicalType::Uuid | CanonicalType::DateTime => match value {
            Value::String(_) => Some(value.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Executes migrations against the two stores.
pub struct Migrator<'a> {
    relational: &'a mut dyn RelationalStore,
    document: &'a mut dyn DocumentStore,
    table: &'a str,
    collection: &'a str,
    /// Identity path existing rows are keyed by (the previously chosen
    /// primary key, or `username` before one exists).
    key_path: &'a str,
}

impl<'a> Migrator<'a> {
    pub fn new(
        relational: &'a mut dyn RelationalStore,
        document: &'a mut dyn DocumentStore,
        table: &'a str,
        collection: &'a str,
        key_path: &'a str,
    ) -> Self {
        Migrator {
            relational,
            document,
            table,
            collection,
            key_path,
        }
    }

    /// Widens a path's stored values to the target type, in whichever
    /// stores its backend touches.
    pub fn widen(
        &mut self,
        path: &str,
        backend: Backend,
        from: CanonicalType,
        to: CanonicalType,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(path, MigrationKind::TypeWidening { from, to });
        if backend.is_relational() {
            self.widen_relational(path, to, &mut report)?;
        }
        if backend.is_document() {
            self.widen_document(path, to, &mut report)?;
        }
        info!(
            path,
            from = %from,
            to = %to,
            migrated = report.migrated,
            skipped = report.skipped,
            "widened stored values"
        );
        Ok(report)
    }

    /// `ALTER` the column to the widened type, then rewrite each row.
    fn widen_relational(
        &mut self,
        path: &str,
        to: CanonicalType,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let column = column_name(path);
        let key_column = column_name(self.key_path);

        if !self.relational.table_columns(self.table)?.contains(&column) {
            return Ok(());
        }

        // DDL first; its failure aborts the flush.
        self.relational
            .modify_column_type(self.table, &column, to.relational_type())?;

        let rows = self.relational.select_pairs(self.table, &key_column, &column)?;
        for (key, value) in rows {
            match convert_value(&value, to) {
                Some(converted) if converted != value => {
                    if let Err(e) = self.relational.update_value(
                        self.table,
                        &key_column,
                        &key,
                        &column,
                        &converted,
                    ) {
                        warn!(path, error = %e, "row rewrite failed");
                        report.errors.push(format!("{path}: {e}"));
                    } else {
                        report.migrated += 1;
                    }
                }
                Some(_) => {}
                None => {
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Scan documents carrying the field, convert the scalar, set it back.
    fn widen_document(
        &mut self,
        path: &str,
        to: CanonicalType,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let pairs = self.document.field_pairs(self.collection, self.key_path, path)?;
        for (key, value) in pairs {
            match convert_value(&value, to) {
                Some(converted) if converted != value => {
                    if let Err(e) = self.document.set_field_for_key(
                        self.collection,
                        self.key_path,
                        &key,
                        path,
                        &converted,
                    ) {
                        warn!(path, error = %e, "document rewrite failed");
                        report.errors.push(format!("{path}: {e}"));
                    } else {
                        report.migrated += 1;
                    }
                }
                Some(_) => {}
                None => {
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Moves a path between backends by copy-then-remove.
    pub fn change_backend(
        &mut self,
        decision: &PlacementDecision,
        from: Backend,
        to: Backend,
    ) -> Result<MigrationReport> {
        let path = &decision.path;
        let mut report = MigrationReport::new(path, MigrationKind::BackendChange { from, to });
        info!(path = %path, %from, %to, "backend change");

        match (from, to) {
            (Backend::Doc, Backend::Sql) => {
                self.copy_documents_to_column(decision, true, &mut report)?;
            }
            (Backend::Doc, Backend::Both) => {
                self.copy_documents_to_column(decision, false, &mut report)?;
            }
            (Backend::Sql, Backend::Doc) => {
                self.copy_column_to_documents(decision, &mut report)?;
                self.relational
                    .drop_column(self.table, &decision.relational_column)?;
            }
            (Backend::Sql, Backend::Both) => {
                self.copy_column_to_documents(decision, &mut report)?;
            }
            (Backend::Both, Backend::Sql) => {
                report.migrated = self.document.unset_field_all(self.collection, path)?;
            }
            (Backend::Both, Backend::Doc) => {
                self.relational
                    .drop_column(self.table, &decision.relational_column)?;
            }
            _ => {}
        }
        Ok(report)
    }

    /// Copy each document's field into the relational column; optionally
    /// unset the field on success.
    fn copy_documents_to_column(
        &mut self,
        decision: &PlacementDecision,
        unset_after: bool,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let column = &decision.relational_column;
        let key_column = column_name(self.key_path);
        let sql_type = decision
            .relational_type
            .clone()
            .unwrap_or_else(|| "TEXT".to_string());

        // The column must exist before rows can be updated.
        self.relational.ensure_table(&TableSpec {
            name: self.table.to_string(),
            columns: vec![ColumnSpec {
                name: column.clone(),
                sql_type,
                nullable: true,
                unique: false,
            }],
        })?;

        let pairs = self
            .document
            .field_pairs(self.collection, self.key_path, &decision.path)?;
        for (key, value) in pairs {
            if let Err(e) =
                self.relational
                    .update_value(self.table, &key_column, &key, column, &value)
            {
                warn!(path = %decision.path, error = %e, "copy to relational failed");
                report.errors.push(format!("{}: {e}", decision.path));
                continue;
            }
            if unset_after {
                if let Err(e) = self.document.unset_field_for_key(
                    self.collection,
                    self.key_path,
                    &key,
                    &decision.path,
                ) {
                    report.errors.push(format!("{}: {e}", decision.path));
                    continue;
                }
            }
            report.migrated += 1;
        }
        Ok(())
    }

    /// Copy non-null column values into the matching documents.
    fn copy_column_to_documents(
        &mut self,
        decision: &PlacementDecision,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let key_column = column_name(self.key_path);
        let pairs =
            self.relational
                .select_pairs(self.table, &key_column, &decision.relational_column)?;
        for (key, value) in pairs {
            match self.document.set_field_for_key(
                self.collection,
                self.key_path,
                &key,
                &decision.path,
                &value,
            ) {
                Ok(true) => report.migrated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(path = %decision.path, error = %e, "copy to document failed");
                    report.errors.push(format!("{}: {e}", decision.path));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_storage::{DocFileStore, Document, SqliteRelational};

    fn doc(v: serde_json::Value) -> Document {
        v.as_object().unwrap().clone()
    }

    fn seeded_stores() -> (SqliteRelational, DocFileStore) {
        let mut sql = SqliteRelational::open_in_memory().unwrap();
        sql.ensure_table(&TableSpec {
            name: "records".to_string(),
            columns: vec![
                ColumnSpec {
                    name: "username".to_string(),
                    sql_type: "VARCHAR(255)".to_string(),
                    nullable: false,
                    unique: true,
                },
                ColumnSpec {
                    name: "zip".to_string(),
                    sql_type: "BIGINT".to_string(),
                    nullable: true,
                    unique: false,
                },
            ],
        })
        .unwrap();

        let mut docs = DocFileStore::in_memory();
        for (name, zip) in [("alice", 90210), ("bob", 10001)] {
            sql.upsert(
                "records",
                Some("username"),
                &doc(json!({"username": name, "zip": zip})),
            )
            .unwrap();
            docs.insert_one(
                "records",
                doc(json!({"username": name, "sys_ingested_at": "2026-02-14T00:00:00+00:00"})),
            )
            .unwrap();
        }
        (sql, docs)
    }

    #[test]
    fn convert_widens_and_refuses_narrowing() {
        assert_eq!(convert_value(&json!(90210), CanonicalType::Str), Some(json!("90210")));
        assert_eq!(convert_value(&json!(true), CanonicalType::Int), Some(json!(1)));
        assert_eq!(convert_value(&json!(3), CanonicalType::Float), Some(json!(3.0)));
        assert_eq!(convert_value(&json!("12"), CanonicalType::Int), Some(json!(12)));
        assert_eq!(convert_value(&json!("abc"), CanonicalType::Int), None);
        assert_eq!(convert_value(&json!([1]), CanonicalType::Str), None);
    }

    #[test]
    fn widen_rewrites_relational_rows() {
        let (mut sql, mut docs) = seeded_stores();
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");

        let report = migrator
            .widen("zip", Backend::Sql, CanonicalType::Int, CanonicalType::Str)
            .unwrap();
        assert_eq!(report.migrated, 2);
        assert_eq!(report.skipped, 0);

        let pairs = sql.select_pairs("records", "username", "zip").unwrap();
        for (_, value) in pairs {
            assert!(value.is_string());
        }
    }

    #[test]
    fn widen_missing_column_is_a_no_op() {
        let (mut sql, mut docs) = seeded_stores();
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");
        let report = migrator
            .widen("ghost", Backend::Sql, CanonicalType::Int, CanonicalType::Str)
            .unwrap();
        assert_eq!(report.migrated, 0);
    }

    #[test]
    fn doc_to_sql_copies_then_unsets() {
        let (mut sql, mut docs) = seeded_stores();
        docs.set_field_for_key(
            "records",
            "username",
            &json!("alice"),
            "optional_note",
            &json!("hello"),
        )
        .unwrap();

        let decision = PlacementDecision::new(
            "optional_note",
            Backend::Sql,
            CanonicalType::Str,
            "promoted",
        );
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");
        let report = migrator
            .change_backend(&decision, Backend::Doc, Backend::Sql)
            .unwrap();
        assert_eq!(report.migrated, 1);

        let pairs = sql.select_pairs("records", "username", "optional_note").unwrap();
        assert_eq!(pairs, vec![(json!("alice"), json!("hello"))]);

        // Unset in the documents after the copy.
        let remaining = docs.field_pairs("records", "username", "optional_note").unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn sql_to_doc_copies_then_drops_column() {
        let (mut sql, mut docs) = seeded_stores();
        let decision = PlacementDecision::new("zip", Backend::Doc, CanonicalType::Int, "demoted");
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");
        let report = migrator
            .change_backend(&decision, Backend::Sql, Backend::Doc)
            .unwrap();
        assert_eq!(report.migrated, 2);

        assert!(!sql.table_columns("records").unwrap().contains(&"zip".to_string()));
        let pairs = docs.field_pairs("records", "username", "zip").unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn doc_to_both_copies_and_keeps_documents() {
        let (mut sql, mut docs) = seeded_stores();
        docs.set_field_for_key(
            "records",
            "username",
            &json!("alice"),
            "optional_note",
            &json!("hello"),
        )
        .unwrap();

        let decision = PlacementDecision::new(
            "optional_note",
            Backend::Both,
            CanonicalType::Str,
            "linked",
        );
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");
        let report = migrator
            .change_backend(&decision, Backend::Doc, Backend::Both)
            .unwrap();
        assert_eq!(report.migrated, 1);

        let pairs = sql.select_pairs("records", "username", "optional_note").unwrap();
        assert_eq!(pairs, vec![(json!("alice"), json!("hello"))]);

        // Unlike Doc -> Sql, the document copy stays in place.
        let remaining = docs.field_pairs("records", "username", "optional_note").unwrap();
        assert_eq!(remaining, vec![(json!("alice"), json!("hello"))]);
    }

    #[test]
    fn sql_to_both_copies_and_keeps_the_column() {
        let (mut sql, mut docs) = seeded_stores();
        let decision = PlacementDecision::new("zip", Backend::Both, CanonicalType::Int, "linked");
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");
        let report = migrator
            .change_backend(&decision, Backend::Sql, Backend::Both)
            .unwrap();
        assert_eq!(report.migrated, 2);

        // Values copied into the documents...
        let pairs = docs.field_pairs("records", "username", "zip").unwrap();
        assert_eq!(pairs.len(), 2);

        // ...and the column keeps its rows.
        assert!(sql.table_columns("records").unwrap().contains(&"zip".to_string()));
        assert_eq!(sql.select_pairs("records", "username", "zip").unwrap().len(), 2);
    }

    #[test]
    fn both_to_doc_drops_the_column_and_keeps_documents() {
        let (mut sql, mut docs) = seeded_stores();
        for (name, zip) in [("alice", 90210), ("bob", 10001)] {
            docs.set_field_for_key("records", "username", &json!(name), "zip", &json!(zip))
                .unwrap();
        }

        let decision = PlacementDecision::new("zip", Backend::Doc, CanonicalType::Int, "demoted");
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");
        migrator
            .change_backend(&decision, Backend::Both, Backend::Doc)
            .unwrap();

        assert!(!sql.table_columns("records").unwrap().contains(&"zip".to_string()));
        let pairs = docs.field_pairs("records", "username", "zip").unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn both_to_sql_unsets_documents() {
        let (mut sql, mut docs) = seeded_stores();
        for name in ["alice", "bob"] {
            docs.set_field_for_key("records", "username", &json!(name), "zip", &json!(1))
                .unwrap();
        }
        let decision = PlacementDecision::new("zip", Backend::Sql, CanonicalType::Int, "narrowed");
        let mut migrator = Migrator::new(&mut sql, &mut docs, "records", "records", "username");
        let report = migrator
            .change_backend(&decision, Backend::Both, Backend::Sql)
            .unwrap();
        assert_eq!(report.migrated, 2);
        assert!(docs.field_pairs("records", "username", "zip").unwrap().is_empty());
    }
}
