//! Runtime context for command execution.

use std::time::Duration;

use anyhow::{Context as _, Result};

use sluice_config::PipelineConfig;
use sluice_pipeline::{MetadataStore, Pipeline, PipelineOptions, Wal};
use sluice_storage::{DocFileStore, SqliteRelational};

use crate::cli::GlobalArgs;

/// Context passed to every command handler: resolved configuration and
/// output flags.
#[derive(Debug)]
pub struct RuntimeContext {
    pub config: PipelineConfig,
    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl RuntimeContext {
    /// Builds the context from parsed global arguments, loading the
    /// layered configuration.
    pub fn from_global_args(global: &GlobalArgs) -> Result<Self, sluice_config::ConfigError> {
        let config = sluice_config::load(global.config.as_deref())?;
        Ok(RuntimeContext {
            config,
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        })
    }

    /// Maps the configuration onto orchestrator options.
    pub fn pipeline_options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::rooted_at(&self.config.metadata_dir);
        options.wal_path = self.config.wal_file.clone();
        options.batch_size = self.config.batch_size;
        options.flush_timeout = Duration::from_secs_f64(self.config.flush_timeout_seconds);
        options.table = self.config.table.clone();
        options.collection = self.config.collection.clone();
        options
    }

    /// Opens the pipeline with the embedded drivers. Recovery (metadata
    /// load, WAL replay and the synchronous flush) happens here.
    pub fn open_pipeline(&self) -> Result<Pipeline> {
        let relational = SqliteRelational::open(self.config.relational_path())
            .context("failed to open the relational store")?;
        let document = DocFileStore::open(self.config.document_dir())
            .context("failed to open the document store")?;
        Pipeline::open(
            self.pipeline_options(),
            Box::new(relational),
            Box::new(document),
        )
        .context("failed to open the pipeline")
    }

    /// Read-only handle on the persisted metadata, for inspection
    /// commands that must not trigger recovery.
    pub fn metadata(&self) -> MetadataStore {
        MetadataStore::new(&self.config.metadata_dir)
    }

    /// Read-only handle on the write-ahead log.
    pub fn wal(&self) -> Wal {
        Wal::new(&self.config.wal_file)
    }
}
