//! `sluice flush` -- flush the buffered batch.
//!
//! Opening the pipeline replays the WAL and runs the recovery flush; the
//! explicit flush afterwards covers anything the recovery left behind.

use anyhow::Result;

use crate::context::RuntimeContext;
use crate::output::print_flush_result;

/// Execute the `sluice flush` command.
pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let mut pipeline = ctx.open_pipeline()?;
    let result = pipeline.flush()?;
    if ctx.json {
        crate::output::output_json(&serde_json::json!({
            "records_processed": result.records_processed,
            "sql_upserts": result.route.sql_upserts,
            "doc_upserts": result.route.doc_upserts,
            "conflicts": result.conflicts,
            "errors": result.errors,
        }))?;
    } else {
        print_flush_result(&result);
    }
    pipeline.close()?;
    Ok(())
}
