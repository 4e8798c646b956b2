//! Clap CLI definitions for the `sluice` command.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// sluice -- adaptive dual-backend ingestion pipeline.
///
/// Observes the statistical shape of a schemaless record stream and
/// routes each field to a relational or a document store, evolving both
/// schemas on-line.
#[derive(Parser, Debug)]
#[command(
    name = "sluice",
    about = "Adaptive dual-backend ingestion pipeline",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file (default: ./sluice.yaml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose/debug output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output (errors only).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest records from the stream URL or a JSONL file.
    Ingest(IngestArgs),

    /// Flush the buffered batch through analysis, routing and persistence.
    Flush,

    /// Show pipeline state: lifetime counts, decisions, WAL backlog.
    Status,

    /// Show the placement decision table.
    Decisions,

    /// Delete metadata, the write-ahead log and both stores.
    Reset(ResetArgs),

    /// Generate shell completions.
    Completion(CompletionArgs),
}

/// Arguments for `sluice ingest`.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct IngestModeArgs {
    /// Number of records to fetch, then stop.
    #[arg(long)]
    pub count: Option<u64>,

    /// Poll until interrupted.
    #[arg(long)]
    pub continuous: bool,

    /// Read records from a JSONL file instead of the stream URL.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Arguments for `sluice ingest`.
#[derive(Args, Debug)]
pub struct IngestArgs {
    #[command(flatten)]
    pub mode: IngestModeArgs,

    /// Delay between fetches, in seconds.
    #[arg(long, default_value_t = 0.1)]
    pub interval: f64,
}

/// Arguments for `sluice reset`.
#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Actually do it.
    #[arg(long)]
    pub confirm: bool,
}

/// Arguments for `sluice completion`.
#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
