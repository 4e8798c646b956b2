//! `sluice reset` -- delete metadata, the WAL and both stores.

use anyhow::{Result, bail};

use crate::cli::ResetArgs;
use crate::context::RuntimeContext;

/// Execute the `sluice reset` command.
pub fn run(ctx: &RuntimeContext, args: &ResetArgs) -> Result<()> {
    if !args.confirm {
        bail!("refusing to reset without --confirm (this deletes all pipeline state)");
    }

    let mut pipeline = ctx.open_pipeline()?;
    pipeline.reset()?;
    if !ctx.quiet {
        println!("pipeline state cleared");
    }
    Ok(())
}
