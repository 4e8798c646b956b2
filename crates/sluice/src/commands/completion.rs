//! `sluice completion` -- generate shell completions.

use anyhow::Result;
use clap::CommandFactory;

use crate::cli::{Cli, CompletionArgs};

/// Execute the `sluice completion` command.
pub fn run(args: &CompletionArgs) -> Result<()> {
    let mut command = Cli::command();
    clap_complete::generate(args.shell, &mut command, "sluice", &mut std::io::stdout());
    Ok(())
}
