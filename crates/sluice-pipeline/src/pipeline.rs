//! The single-writer pipeline orchestrator.
//!
//! One ingest loop owns the buffer and the analyzer. Within a flush the
//! ordering is fixed: analyze → classify → merge decisions & detect
//! conflicts → migrate → ensure schema → route → persist metadata →
//! truncate WAL → clear buffer. Schema failures abort with buffer and WAL
//! intact; a metadata write failure leaves the WAL for the next flush.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use sluice_analysis::widening::{TypeConflict, WideningAction, detect_conflicts, resolve};
use sluice_analysis::{
    Backend, Classifier, ClassificationThresholds, FieldAnalyzer, PlacementDecision,
};
use sluice_core::CanonicalType;
use sluice_core::record::{IDENTITY_FIELD, Record, is_linking};
use sluice_normalize::RecordNormalizer;
use sluice_storage::{DocumentStore, RelationalStore};

use crate::error::{PipelineError, Result};
use crate::metadata::{MetadataStore, PipelineState};
use crate::migrator::{MigrationReport, Migrator};
use crate::router::{RouteResult, Router};
use crate::wal::Wal;

/// Orchestrator knobs, resolved from configuration by the caller.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub metadata_dir: PathBuf,
    pub wal_path: PathBuf,
    pub batch_size: usize,
    pub flush_timeout: Duration,
    pub table: String,
    pub collection: String,
    pub thresholds: ClassificationThresholds,
}

impl PipelineOptions {
    /// Defaults rooted at the given metadata directory.
    pub fn rooted_at(metadata_dir: impl Into<PathBuf>) -> Self {
        let metadata_dir = metadata_dir.into();
        PipelineOptions {
            wal_path: metadata_dir.join("wal.log"),
            metadata_dir,
            batch_size: 50,
            flush_timeout: Duration::from_secs_f64(5.0),
            table: "records".to_string(),
            collection: "records".to_string(),
            thresholds: ClassificationThresholds::default(),
        }
    }
}

/// Structured result of one flush.
#[derive(Debug, Clone, Default)]
pub struct FlushResult {
    pub records_processed: u64,
    pub conflicts: Vec<TypeConflict>,
    pub migrations: Vec<MigrationReport>,
    pub route: RouteResult,
    pub primary_key: Option<String>,
    pub decision_count: usize,
    pub errors: Vec<String>,
}

/// Read-only view of the pipeline for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub buffer_size: usize,
    pub total_records: u64,
    pub last_flush: Option<chrono::DateTime<Utc>>,
    pub version: u64,
    pub decision_count: usize,
    pub primary_key: Option<String>,
    pub sql_fields: Vec<String>,
    pub doc_fields: Vec<String>,
    pub both_fields: Vec<String>,
}

/// Exclusive lock on the metadata directory; concurrent pipelines over
/// the same state are unsupported.
struct DirLock {
    file: File,
}

impl DirLock {
    fn acquire(dir: &std::path::Path) -> Result<Self> {
        let path = dir.join(".lock");
        let file = File::create(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| PipelineError::Locked(path.display().to_string()))?;
        Ok(DirLock { file })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// The classification-and-routing engine.
pub struct Pipeline {
    options: PipelineOptions,
    normalizer: RecordNormalizer,
    analyzer: FieldAnalyzer,
    classifier: Classifier,
    decisions: BTreeMap<String, PlacementDecision>,
    primary_key: Option<String>,
    buffer: Vec<Record>,
    wal: Wal,
    metadata: MetadataStore,
    relational: Box<dyn RelationalStore>,
    document: Box<dyn DocumentStore>,
    state: PipelineState,
    metadata_dirty: bool,
    last_flush: Instant,
    _lock: DirLock,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Opens the pipeline: acquires the directory lock, replays persisted
    /// metadata and the WAL, and issues the synchronous recovery flush
    /// before accepting new input.
    pub fn open(
        options: PipelineOptions,
        relational: Box<dyn RelationalStore>,
        document: Box<dyn DocumentStore>,
    ) -> Result<Self> {
        fs::create_dir_all(&options.metadata_dir)?;
        let lock = DirLock::acquire(&options.metadata_dir)?;

        let metadata = MetadataStore::new(&options.metadata_dir);
        let (decisions, stats, state) = if metadata.exists() {
            metadata.load()?
        } else {
            (BTreeMap::new(), BTreeMap::new(), PipelineState::default())
        };
        let primary_key = decisions
            .values()
            .find(|d| d.is_primary_key)
            .map(|d| d.path.clone());
        let analyzer = FieldAnalyzer::from_parts(stats, state.total_records);

        let wal = Wal::new(&options.wal_path);
        let buffer = wal.replay();

        let mut pipeline = Pipeline {
            normalizer: RecordNormalizer::new(),
            analyzer,
            classifier: Classifier::new(options.thresholds.clone()),
            decisions,
            primary_key,
            buffer,
            wal,
            metadata,
            relational,
            document,
            state,
            metadata_dirty: false,
            last_flush: Instant::now(),
            _lock: lock,
            options,
        };

        if !pipeline.buffer.is_empty() {
            info!(
                records = pipeline.buffer.len(),
                "recovering journaled records"
            );
            if let Err(e) = pipeline.flush() {
                warn!(error = %e, "recovery flush failed, batch retained for retry");
            }
        }
        Ok(pipeline)
    }

    /// Normalizes and buffers one raw record, journaling it first. Flushes
    /// when the batch size or the timeout says so; the triggered flush's
    /// result is returned.
    pub fn ingest(&mut self, raw: &Record) -> Result<Option<FlushResult>> {
        let normalized = self.normalizer.normalize(raw)?;
        self.wal.append(&normalized.record)?;
        self.buffer.push(normalized.record);

        if self.should_flush() {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Ingests a batch; rejected records are surfaced per index without
    /// aborting the rest.
    pub fn ingest_batch(&mut self, raws: &[Record]) -> Vec<Result<Option<FlushResult>>> {
        raws.iter().map(|raw| self.ingest(raw)).collect()
    }

    fn should_flush(&self) -> bool {
        if self.buffer.len() >= self.options.batch_size {
            return true;
        }
        !self.buffer.is_empty() && self.last_flush.elapsed() >= self.options.flush_timeout
    }

    /// Flushes the buffered batch through the full ordering.
    pub fn flush(&mut self) -> Result<FlushResult> {
        if self.buffer.is_empty() {
            // Nothing to route, but a previous flush may have failed to
            // persist its state.
            if self.metadata_dirty {
                self.document.persist()?;
                self.persist_metadata()?;
                self.wal.truncate()?;
            }
            return Ok(FlushResult {
                primary_key: self.primary_key.clone(),
                decision_count: self.decisions.len(),
                ..FlushResult::default()
            });
        }

        // An aborted flush must not leave the batch double-counted in the
        // statistics when it is retried.
        let analyzer_backup = self.analyzer.clone();
        match self.flush_batch() {
            Ok(result) => Ok(result),
            Err(e) => {
                self.analyzer = analyzer_backup;
                Err(e)
            }
        }
    }

    fn flush_batch(&mut self) -> Result<FlushResult> {
        let batch = self.buffer.clone();
        debug!(records = batch.len(), "flushing batch");

        // 1-2: analyze, classify.
        self.analyzer.analyze_batch(&batch);
        let fresh = self
            .classifier
            .classify_all(self.analyzer.stats(), self.analyzer.total_records());

        // 3: detect conflicts against the stored decisions.
        let conflicts = detect_conflicts(self.analyzer.stats(), &self.decisions);

        // 4a: merge stored and fresh decisions into a plan.
        let (mut merged, plans) = self.merge_decisions(fresh);
        for decision in merged.values_mut() {
            decision.is_primary_key = false;
        }
        let primary_key = self.classifier.select_primary_key(
            &mut merged,
            self.analyzer.stats(),
            self.analyzer.total_records(),
        );
        if primary_key.is_none() && !merged.is_empty() {
            warn!("no primary key candidate qualified, relying on surrogate row ids");
        }

        // 4b: migrate before any write so the batch sees the new schema.
        // A DDL failure aborts here with buffer and WAL intact.
        let migration_key = self
            .primary_key
            .clone()
            .unwrap_or_else(|| IDENTITY_FIELD.to_string());
        let mut migrations = Vec::new();
        {
            let mut migrator = Migrator::new(
                self.relational.as_mut(),
                self.document.as_mut(),
                &self.options.table,
                &self.options.collection,
                &migration_key,
            );
            for plan in &plans {
                let report = match plan {
                    MigrationPlan::Widen {
                        path,
                        backend,
                        from,
                        to,
                    } => migrator.widen(path, *backend, *from, *to)?,
                    MigrationPlan::ChangeBackend { path, from, to } => {
                        let decision = &merged[path];
                        migrator.change_backend(decision, *from, *to)?
                    }
                };
                migrations.push(report);
            }
        }

        // 5: ensure target schemas.
        let mut router = Router::new(
            self.relational.as_mut(),
            self.document.as_mut(),
            &self.options.table,
            &self.options.collection,
        );
        router.ensure_schema(&merged, primary_key.as_deref())?;

        // 6: route and upsert. Per-record failures never abort.
        let route = router.route_batch(&batch, &merged, primary_key.as_deref());

        let mut errors: Vec<String> = route.errors.clone();
        if let Err(e) = self.document.persist() {
            warn!(error = %e, "document store persistence failed");
            errors.push(format!("document persistence: {e}"));
            self.metadata_dirty = true;
        }

        // 7: persist metadata. Failure keeps the WAL (truncation is
        // strictly ordered after persistence) and retries next flush.
        self.decisions = merged;
        self.primary_key = primary_key.clone();
        self.state.total_records = self.analyzer.total_records();
        self.state.last_flush = Some(Utc::now());
        self.state.version += 1;

        if let Err(e) = self.persist_metadata() {
            warn!(error = %e, "metadata persistence failed, retrying next flush");
            errors.push(format!("metadata persistence: {e}"));
        }

        // 8: truncate the WAL only after everything above persisted.
        if !self.metadata_dirty {
            self.wal.truncate()?;
        }

        self.buffer.clear();
        self.last_flush = Instant::now();

        info!(
            records = batch.len(),
            sql_upserts = route.sql_upserts,
            doc_upserts = route.doc_upserts,
            conflicts = conflicts.len(),
            migrations = migrations.len(),
            errors = errors.len(),
            "flush complete"
        );
        Ok(FlushResult {
            records_processed: batch.len() as u64,
            conflicts,
            migrations,
            route,
            primary_key,
            decision_count: self.decisions.len(),
            errors,
        })
    }

    fn persist_metadata(&mut self) -> Result<()> {
        match self
            .metadata
            .save_all(&self.decisions, self.analyzer.stats(), &self.state)
        {
            Ok(()) => {
                self.metadata_dirty = false;
                Ok(())
            }
            Err(e) => {
                self.metadata_dirty = true;
                Err(e)
            }
        }
    }

    /// Merges fresh classifier output with the stored decisions.
    ///
    /// A relational column whose history has drifted keeps its backend and
    /// takes the widened type instead of flapping to the document store;
    /// arrays and objects arriving on a relational scalar force a move;
    /// sparsity demotions and document-side promotions go through backend
    /// migrations.
    fn merge_decisions(
        &self,
        fresh: BTreeMap<String, PlacementDecision>,
    ) -> (BTreeMap<String, PlacementDecision>, Vec<MigrationPlan>) {
        let mut merged = BTreeMap::new();
        let mut plans = Vec::new();

        for (path, fresh_decision) in fresh {
            let Some(previous) = self.decisions.get(&path) else {
                merged.insert(path, fresh_decision);
                continue;
            };

            if is_linking(&path) {
                merged.insert(path, fresh_decision);
                continue;
            }

            if !previous.backend.is_relational() {
                // Document-side paths adopt fresh evidence freely; a
                // promotion to the relational side is a backend change.
                if fresh_decision.backend != previous.backend {
                    plans.push(MigrationPlan::ChangeBackend {
                        path: path.clone(),
                        from: previous.backend,
                        to: fresh_decision.backend,
                    });
                }
                merged.insert(path, fresh_decision);
                continue;
            }

            let dominant = self
                .analyzer
                .stats()
                .get(&path)
                .map(|f| f.dominant_type())
                .unwrap_or(previous.canonical_type);

            if matches!(dominant, CanonicalType::Array | CanonicalType::Object) {
                plans.push(MigrationPlan::ChangeBackend {
                    path: path.clone(),
                    from: previous.backend,
                    to: Backend::Doc,
                });
                let mut demoted = fresh_decision;
                demoted.backend = Backend::Doc;
                demoted.relational_type = None;
                merged.insert(path, demoted);
                continue;
            }

            let sparse = self
                .analyzer
                .stats()
                .get(&path)
                .map(|f| {
                    f.presence_ratio(self.analyzer.total_records())
                        < self.options.thresholds.min_presence_ratio
                })
                .unwrap_or(false);
            if sparse && fresh_decision.backend == Backend::Doc {
                plans.push(MigrationPlan::ChangeBackend {
                    path: path.clone(),
                    from: previous.backend,
                    to: Backend::Doc,
                });
                merged.insert(path, fresh_decision);
                continue;
            }

            match resolve(previous.canonical_type, dominant) {
                WideningAction::Widen(to) => {
                    let mut widened = previous.clone();
                    widened.widen_to(
                        to,
                        format!("widened from {} after type drift", previous.canonical_type),
                    );
                    plans.push(MigrationPlan::Widen {
                        path: path.clone(),
                        backend: previous.backend,
                        from: previous.canonical_type,
                        to,
                    });
                    merged.insert(path, widened);
                }
                WideningAction::NoOp if fresh_decision.backend == previous.backend => {
                    // Evidence agrees; adopt the fresh reason and flags.
                    merged.insert(path, fresh_decision);
                }
                WideningAction::NoOp | WideningAction::AlreadyWide => {
                    merged.insert(path, previous.clone());
                }
                WideningAction::MigrateToDocument => {
                    plans.push(MigrationPlan::ChangeBackend {
                        path: path.clone(),
                        from: previous.backend,
                        to: Backend::Doc,
                    });
                    let mut demoted = previous.clone();
                    demoted.backend = Backend::Doc;
                    demoted.relational_type = None;
                    demoted.canonical_type = dominant;
                    demoted.reason = "structured values arrived on a relational column".to_string();
                    merged.insert(path, demoted);
                }
            }
        }

        (merged, plans)
    }

    /// Read-only status view.
    pub fn status(&self) -> PipelineStatus {
        let mut sql_fields = Vec::new();
        let mut doc_fields = Vec::new();
        let mut both_fields = Vec::new();
        for decision in self.decisions.values() {
            match decision.backend {
                Backend::Sql => sql_fields.push(decision.path.clone()),
                Backend::Doc => doc_fields.push(decision.path.clone()),
                Backend::Both => both_fields.push(decision.path.clone()),
            }
        }
        PipelineStatus {
            buffer_size: self.buffer.len(),
            total_records: self.state.total_records,
            last_flush: self.state.last_flush,
            version: self.state.version,
            decision_count: self.decisions.len(),
            primary_key: self.primary_key.clone(),
            sql_fields,
            doc_fields,
            both_fields,
        }
    }

    /// Current placement decisions.
    pub fn decisions(&self) -> &BTreeMap<String, PlacementDecision> {
        &self.decisions
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clears persisted metadata, the WAL and both stores.
    pub fn reset(&mut self) -> Result<()> {
        self.metadata.clear()?;
        self.wal.truncate()?;
        self.relational.drop_table(&self.options.table)?;
        self.document.drop_collection(&self.options.collection)?;

        self.analyzer = FieldAnalyzer::new();
        self.decisions.clear();
        self.primary_key = None;
        self.buffer.clear();
        self.state = PipelineState::default();
        self.metadata_dirty = false;
        info!("pipeline reset");
        Ok(())
    }

    /// Final flush on shutdown. A failure leaves the WAL for the next run.
    pub fn close(mut self) -> Result<FlushResult> {
        self.flush()
    }
}

/// One planned migration, derived during decision merging.
#[derive(Debug, Clone)]
enum MigrationPlan {
    Widen {
        path: String,
        backend: Backend,
        from: CanonicalType,
        to: CanonicalType,
    },
    ChangeBackend {
        path: String,
        from: Backend,
        to: Backend,
    },
}
