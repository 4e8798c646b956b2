//! `sluice status` -- read-only view of the persisted pipeline state.
//!
//! Reads the metadata files and the WAL directly instead of opening the
//! pipeline, so inspecting state never triggers recovery.

use anyhow::Result;
use owo_colors::OwoColorize;

use sluice_analysis::Backend;

use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `sluice status` command.
pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let metadata = ctx.metadata();
    let (decisions, _, state) = metadata.load()?;
    let wal_backlog = ctx.wal().record_count();

    let count = |backend: Backend| {
        decisions
            .values()
            .filter(|d| d.backend == backend)
            .count()
    };
    let primary_key = decisions
        .values()
        .find(|d| d.is_primary_key)
        .map(|d| d.path.clone());

    if ctx.json {
        return output_json(&serde_json::json!({
            "total_records": state.total_records,
            "last_flush": state.last_flush,
            "version": state.version,
            "wal_backlog": wal_backlog,
            "decisions": decisions.len(),
            "primary_key": primary_key,
            "sql_fields": count(Backend::Sql),
            "doc_fields": count(Backend::Doc),
            "both_fields": count(Backend::Both),
        }));
    }

    println!("{}", "pipeline status".bold());
    println!("  total records   {}", state.total_records);
    match state.last_flush {
        Some(at) => println!("  last flush      {at}"),
        None => println!("  last flush      never"),
    }
    println!("  state version   {}", state.version);
    println!("  wal backlog     {wal_backlog}");
    println!(
        "  decisions       {} ({} sql, {} doc, {} both)",
        decisions.len(),
        count(Backend::Sql),
        count(Backend::Doc),
        count(Backend::Both),
    );
    match primary_key {
        Some(pk) => println!("  primary key     {pk}"),
        None => println!("  primary key     none (surrogate row ids)"),
    }
    Ok(())
}
