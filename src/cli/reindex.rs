//! CLI `reindex` command — rebuild the keyword index and re-embed every record.

use anyhow::Result;

use crate::config::LoreConfig;

pub async fn reindex(config: &LoreConfig) -> Result<()> {
    let engine = super::open_engine(config)?;
    let total = engine.snapshot().len();

    match engine.provider_name() {
        Some(name) => println!("Reindexing {total} records with provider '{name}'..."),
        None => println!("Reindexing {total} records (keyword only, no embedding provider)..."),
    }

    let pb = super::progress_bar(total)?;
    let summary = engine.reindex(&|done: usize| pb.set_position(done as u64)).await?;
    pb.finish_and_clear();

    println!(
        "Keyword index: {} records, {} terms.",
        summary.keyword.entries, summary.keyword.terms
    );
    if summary.keyword.skipped > 0 {
        println!("  Skipped {} record(s) with no searchable text.", summary.keyword.skipped);
    }

    if let Some(report) = summary.vector {
        println!(
            "Vector index:  {} embedded, {} removed, {} failed.",
            report.indexed,
            report.removed,
            report.failed.len()
        );
        for (id, reason) in &report.failed {
            println!("  {id}: {reason}");
        }
    }
    Ok(())
}
