//! `sluice` -- adaptive dual-backend ingestion pipeline CLI.
//!
//! Parses arguments with clap, resolves the layered configuration, and
//! dispatches to command handlers. Exit codes: 0 success, 1 runtime
//! error, 2 misconfiguration.

mod cli;
mod commands;
mod context;
mod output;

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use cli::{Cli, Commands};
use context::RuntimeContext;

/// Set once the first Ctrl+C arrives; the ingest loop stops between
/// records. A second signal forces exit.
static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Returns `true` once a shutdown has been requested.
pub(crate) fn cancelled() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

fn main() {
    let _ = ctrlc::set_handler(|| {
        if CANCELLED.swap(true, Ordering::SeqCst) {
            // Second signal: force exit.
            std::process::exit(1);
        }
        eprintln!("\nstopping after the current record (Ctrl+C again to force)");
    });

    let cli = Cli::parse();

    // Logging goes to stderr so JSON output stays parseable.
    let filter = if cli.global.verbose {
        "sluice=debug"
    } else if cli.global.quiet {
        "sluice=error"
    } else {
        "sluice=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = match RuntimeContext::from_global_args(&cli.global) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Some(Commands::Ingest(args)) => commands::ingest::run(&ctx, &args),
        Some(Commands::Flush) => commands::flush::run(&ctx),
        Some(Commands::Status) => commands::status::run(&ctx),
        Some(Commands::Decisions) => commands::decisions::run(&ctx),
        Some(Commands::Reset(args)) => commands::reset::run(&ctx, &args),
        Some(Commands::Completion(args)) => commands::completion::run(&args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        if ctx.json {
            let err_json = serde_json::json!({ "error": format!("{e:#}") });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{s}");
            }
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}
