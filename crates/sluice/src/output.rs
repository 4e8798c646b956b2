//! Output formatting helpers for the `sluice` CLI.

use std::io::{self, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use sluice_analysis::{Backend, PlacementDecision};
use sluice_pipeline::FlushResult;

/// Prints a value as pretty JSON to stdout.
pub fn output_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

/// Renders a backend tag with its conventional color.
pub fn backend_label(backend: Backend) -> String {
    match backend {
        Backend::Sql => backend.as_str().blue().to_string(),
        Backend::Doc => backend.as_str().green().to_string(),
        Backend::Both => backend.as_str().magenta().to_string(),
    }
}

/// Prints the decision table in a human-readable layout.
pub fn print_decision_table<'a>(decisions: impl Iterator<Item = &'a PlacementDecision>) {
    println!(
        "{:<30} {:<6} {:<14} {:<26} {:>4} {:>4} {:>4}  {}",
        "PATH", "WHERE", "SQL TYPE", "COLUMN", "NULL", "UNIQ", "PK", "REASON"
    );
    for decision in decisions {
        println!(
            "{:<30} {:<6} {:<14} {:<26} {:>4} {:>4} {:>4}  {}",
            decision.path,
            backend_label(decision.backend),
            decision.relational_type.as_deref().unwrap_or("-"),
            if decision.backend.is_relational() {
                decision.relational_column.as_str()
            } else {
                "-"
            },
            flag(decision.is_nullable),
            flag(decision.is_unique),
            flag(decision.is_primary_key),
            decision.reason,
        );
    }
}

fn flag(value: bool) -> &'static str {
    if value { "yes" } else { "-" }
}

/// One-line summary of a flush result.
pub fn print_flush_result(result: &FlushResult) {
    println!(
        "flushed {} records ({} relational upserts, {} document upserts)",
        result.records_processed, result.route.sql_upserts, result.route.doc_upserts,
    );
    for conflict in &result.conflicts {
        println!(
            "  type drift on {}: {} -> {} ({})",
            conflict.path.yellow(),
            conflict.stored_type,
            conflict.incoming_type,
            conflict.reason
        );
    }
    for migration in &result.migrations {
        println!(
            "  migrated {}: {} rows ({} skipped)",
            migration.path.yellow(),
            migration.migrated,
            migration.skipped
        );
    }
    for error in &result.errors {
        eprintln!("  {} {}", "error:".red(), error);
    }
}
