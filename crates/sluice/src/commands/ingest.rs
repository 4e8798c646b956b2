//! `sluice ingest` -- pull records from the stream URL or a JSONL file.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::warn;

use sluice_pipeline::{HttpSource, JsonlSource, RecordSource};

use crate::cli::IngestArgs;
use crate::context::RuntimeContext;
use crate::output::print_flush_result;

/// Consecutive source errors after which a polling run gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Execute the `sluice ingest` command.
pub fn run(ctx: &RuntimeContext, args: &IngestArgs) -> Result<()> {
    let mut pipeline = ctx.open_pipeline()?;

    let from_file = args.mode.file.is_some();
    let mut source: Box<dyn RecordSource> = match &args.mode.file {
        Some(path) => Box::new(
            JsonlSource::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(HttpSource::new(&ctx.config.data_stream_url)),
    };

    if !ctx.quiet {
        match &args.mode.file {
            Some(path) => println!("ingesting from {}", path.display()),
            None => println!("ingesting from {}", ctx.config.data_stream_url),
        }
    }

    let started = Instant::now();
    let mut ingested: u64 = 0;
    let mut rejected: u64 = 0;
    let mut consecutive_errors: u32 = 0;

    loop {
        if crate::cancelled() {
            break;
        }
        if let Some(limit) = args.mode.count {
            if ingested >= limit {
                break;
            }
        }

        match source.fetch_one() {
            Ok(Some(raw)) => {
                consecutive_errors = 0;
                match pipeline.ingest(&raw) {
                    Ok(flushed) => {
                        ingested += 1;
                        if let Some(result) = flushed {
                            if !ctx.quiet {
                                print_flush_result(&result);
                            }
                        }
                    }
                    Err(e)
                        if matches!(
                            e,
                            sluice_pipeline::PipelineError::Normalize(_)
                                | sluice_pipeline::PipelineError::Io(_)
                        ) =>
                    {
                        rejected += 1;
                        warn!(error = %e, "record rejected");
                    }
                    Err(e) => {
                        // The record is buffered and journaled; the flush
                        // that failed will be retried.
                        ingested += 1;
                        warn!(error = %e, "flush failed, batch retained");
                    }
                }
                if !ctx.quiet && ingested > 0 && ingested % 10 == 0 {
                    println!("  {ingested} records ingested ({} buffered)", pipeline.buffer_len());
                }
            }
            Ok(None) => break, // file exhausted
            Err(e) => {
                consecutive_errors += 1;
                warn!(error = %e, attempt = consecutive_errors, "fetch failed");
                if from_file || consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    anyhow::bail!("giving up after {consecutive_errors} consecutive source errors: {e}");
                }
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        }

        if !from_file && args.interval > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(args.interval));
        }
    }

    // Final flush; on failure the WAL keeps the batch for the next run.
    let result = pipeline.close().context("final flush failed")?;
    if !ctx.quiet {
        print_flush_result(&result);
        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            ingested as f64 / elapsed
        } else {
            0.0
        };
        println!(
            "ingested {ingested} records in {elapsed:.1}s ({rate:.1} rec/s), {rejected} rejected"
        );
    }
    Ok(())
}
