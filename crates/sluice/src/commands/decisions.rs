//! `sluice decisions` -- show the placement decision table.

use anyhow::Result;

use crate::context::RuntimeContext;
use crate::output::{output_json, print_decision_table};

/// Execute the `sluice decisions` command.
pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let (decisions, _, _) = ctx.metadata().load()?;

    if ctx.json {
        return output_json(&decisions);
    }
    if decisions.is_empty() {
        println!("no decisions yet; ingest some records first");
        return Ok(());
    }
    print_decision_table(decisions.values());
    Ok(())
}
