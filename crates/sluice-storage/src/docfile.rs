//! [`DocFileStore`] -- embedded document driver.
//!
//! Collections of JSON documents held in memory and persisted as one
//! JSONL file per collection under a directory. Indexes and the validator
//! are rebuilt by the pipeline on every flush and are not persisted.

use std::collections::BTreeMap;
use std::fs;
use std::io::BufReader;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info, warn};

use sluice_core::jsonl;
use sluice_core::record::INGESTED_AT_FIELD;

use crate::error::{Result, StorageError};
use crate::traits::{Document, DocumentStore};

/// One index over a collection field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
    /// Fields required to be present and string-typed on insert.
    validator: Vec<String>,
    dirty: bool,
}

/// Embedded implementation of [`DocumentStore`].
pub struct DocFileStore {
    dir: Option<PathBuf>,
    collections: BTreeMap<String, Collection>,
}

impl DocFileStore {
    /// Opens a store rooted at the given directory, loading any existing
    /// collection files.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut collections = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "jsonl") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let reader = BufReader::new(fs::File::open(&path)?);
            let mut documents = Vec::new();
            for item in jsonl::read_jsonl::<_, Document>(reader) {
                match item {
                    Ok(doc) => documents.push(doc),
                    Err(e) => {
                        warn!(collection = name, error = %e, "skipping unreadable document");
                    }
                }
            }
            debug!(collection = name, documents = documents.len(), "loaded collection");
            collections.insert(
                name.to_string(),
                Collection {
                    documents,
                    ..Collection::default()
                },
            );
        }

        info!(?dir, collections = collections.len(), "opened document store");
        Ok(DocFileStore {
            dir: Some(dir),
            collections,
        })
    }

    /// Opens a purely in-memory store (useful for tests).
    pub fn in_memory() -> Self {
        DocFileStore {
            dir: None,
            collections: BTreeMap::new(),
        }
    }

    /// Indexes currently on a collection.
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    /// All documents of a collection, for inspection.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(name.to_string()).or_default()
    }

    fn validate(collection: &Collection, doc: &Document) -> Result<()> {
        for field in &collection.validator {
            match get_path(doc, field) {
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(StorageError::validation(format!(
                        "field '{field}' must be string-typed"
                    )));
                }
                None => {
                    return Err(StorageError::validation(format!(
                        "required field '{field}' is missing"
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_unique(collection: &Collection, doc: &Document) -> Result<()> {
        for index in collection.indexes.iter().filter(|i| i.unique) {
            let Some(value) = get_path(doc, &index.field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let clash = collection
                .documents
                .iter()
                .any(|existing| get_path(existing, &index.field) == Some(value));
            if clash {
                return Err(StorageError::DuplicateKey {
                    field: index.field.clone(),
                });
            }
        }
        Ok(())
    }
}

impl DocumentStore for DocFileStore {
    fn ensure_indexes(&mut self, collection: &str, primary_key: Option<&str>) -> Result<()> {
        let coll = self.collection_mut(collection);
        coll.indexes.clear();
        if let Some(pk) = primary_key {
            // Degrade to non-unique when historical duplicates exist.
            let mut seen = Vec::new();
            let mut unique = true;
            for doc in &coll.documents {
                if let Some(v) = get_path(doc, pk) {
                    if !v.is_null() && seen.contains(&v) {
                        unique = false;
                        break;
                    }
                    seen.push(v);
                }
            }
            if !unique {
                warn!(collection, field = pk, "duplicates present, primary index not unique");
            }
            coll.indexes.push(IndexSpec {
                field: pk.to_string(),
                unique,
            });
        }
        coll.indexes.push(IndexSpec {
            field: INGESTED_AT_FIELD.to_string(),
            unique: false,
        });
        Ok(())
    }

    fn set_validator(&mut self, collection: &str, required: &[String]) -> Result<()> {
        self.collection_mut(collection).validator = required.to_vec();
        Ok(())
    }

    fn insert_one(&mut self, collection: &str, doc: Document) -> Result<()> {
        let coll = self.collection_mut(collection);
        Self::validate(coll, &doc)?;
        Self::check_unique(coll, &doc)?;
        coll.documents.push(doc);
        coll.dirty = true;
        Ok(())
    }

    fn upsert_one(
        &mut self,
        collection: &str,
        key_field: &str,
        key: &Value,
        fields: &Document,
    ) -> Result<()> {
        let coll = self.collection_mut(collection);

        let position = coll
            .documents
            .iter()
            .position(|doc| get_path(doc, key_field) == Some(key));

        match position {
            Some(i) => {
                let mut updated = coll.documents[i].clone();
                for (field, value) in fields {
                    set_path(&mut updated, field, value.clone());
                }
                Self::validate(coll, &updated)?;
                coll.documents[i] = updated;
            }
            None => {
                let mut doc = Document::new();
                for (field, value) in fields {
                    set_path(&mut doc, field, value.clone());
                }
                set_path(&mut doc, key_field, key.clone());
                Self::validate(coll, &doc)?;
                Self::check_unique(coll, &doc)?;
                coll.documents.push(doc);
            }
        }
        coll.dirty = true;
        Ok(())
    }

    fn field_pairs(
        &self,
        collection: &str,
        key_field: &str,
        field: &str,
    ) -> Result<Vec<(Value, Value)>> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut pairs = Vec::new();
        for doc in &coll.documents {
            let Some(value) = get_path(doc, field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let Some(key) = get_path(doc, key_field) else {
                continue;
            };
            pairs.push((key.clone(), value.clone()));
        }
        Ok(pairs)
    }

    fn set_field_for_key(
        &mut self,
        collection: &str,
        key_field: &str,
        key: &Value,
        field: &str,
        value: &Value,
    ) -> Result<bool> {
        let coll = self.collection_mut(collection);
        let Some(doc) = coll
            .documents
            .iter_mut()
            .find(|doc| get_path(doc, key_field) == Some(key))
        else {
            return Ok(false);
        };
        set_path(doc, field, value.clone());
        coll.dirty = true;
        Ok(true)
    }

    fn unset_field_for_key(
        &mut self,
        collection: &str,
        key_field: &str,
        key: &Value,
        field: &str,
    ) -> Result<bool> {
        let coll = self.collection_mut(collection);
        let Some(doc) = coll
            .documents
            .iter_mut()
            .find(|doc| get_path(doc, key_field) == Some(key))
        else {
            return Ok(false);
        };
        unset_path(doc, field);
        coll.dirty = true;
        Ok(true)
    }

    fn unset_field_all(&mut self, collection: &str, field: &str) -> Result<u64> {
        let coll = self.collection_mut(collection);
        let mut changed = 0;
        for doc in &mut coll.documents {
            if get_path(doc, field).is_some() {
                unset_path(doc, field);
                changed += 1;
            }
        }
        if changed > 0 {
            coll.dirty = true;
        }
        Ok(changed)
    }

    fn count_documents(&self, collection: &str) -> Result<u64> {
        Ok(self
            .collections
            .get(collection)
            .map(|c| c.documents.len() as u64)
            .unwrap_or(0))
    }

    fn drop_collection(&mut self, collection: &str) -> Result<()> {
        self.collections.remove(collection);
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{collection}.jsonl"));
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        for (name, coll) in &mut self.collections {
            if !coll.dirty {
                continue;
            }
            let path = dir.join(format!("{name}.jsonl"));
            let tmp = dir.join(format!("{name}.jsonl.tmp"));
            let mut file = fs::File::create(&tmp)?;
            jsonl::write_jsonl(&mut file, &coll.documents).map_err(|e| match e {
                jsonl::JsonlError::Io(io) => StorageError::Io(io),
                jsonl::JsonlError::Json { source, .. } => StorageError::Serialization(source),
            })?;
            fs::rename(&tmp, &path)?;
            coll.dirty = false;
            debug!(collection = %name, documents = coll.documents.len(), "persisted collection");
        }
        Ok(())
    }
}

/// Navigates a dot path into a nested document.
fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Sets a dot path in a nested document, creating intermediate objects.
fn set_path(doc: &mut Document, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        if !entry.is_object() {
            *entry = Value::Object(Document::new());
        }
        current = entry.as_object_mut().expect("just ensured an object");
    }
    current.insert(segments[segments.len() - 1].to_string(), value);
}

/// Removes a dot path from a nested document. Empty parents are left in
/// place, matching `$unset` semantics.
fn unset_path(doc: &mut Document, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        let Some(next) = current.get_mut(*segment).and_then(|v| v.as_object_mut()) else {
            return;
        };
        current = next;
    }
    current.remove(segments[segments.len() - 1]);
}
