use anyhow::Result;

use crate::config::LoreConfig;

/// Display corpus, index and cache statistics.
pub async fn stats(config: &LoreConfig, json: bool) -> Result<()> {
    let engine = super::open_engine(config)?;
    let stats = engine.get_stats().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Knowledge Statistics");
    println!("{}", "=".repeat(40));
    println!("  Records:             {}", stats.corpus_size);
    println!("  Indexed (keyword):   {}", stats.indexed_records);
    println!("  Distinct terms:      {}", stats.indexed_terms);
    println!("  Vectors:             {}", stats.vector_count);
    println!("  Vector backend:      {}", stats.vector_status);
    println!();

    println!("By File:");
    for (file, count) in &stats.by_file {
        println!("  {:<24} {}", file, count);
    }
    println!();

    println!(
        "Embedding cache:       {} entries, {:.1}% hit rate",
        stats.cache.size,
        stats.cache_hit_rate * 100.0
    );
    Ok(())
}

/// List records flagged as stale, oldest first.
pub async fn stale(config: &LoreConfig, days: Option<u64>, json: bool) -> Result<()> {
    let engine = super::open_engine(config)?;
    let stale = engine.get_stale_records(days).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stale)?);
        return Ok(());
    }

    if stale.is_empty() {
        println!("No stale records.");
        return Ok(());
    }

    println!("{} stale record(s)\n", stale.len());
    for entry in &stale {
        let reasons: Vec<String> = entry.reasons.iter().map(ToString::to_string).collect();
        println!(
            "  {} [{}/{}] {}",
            entry.record.id,
            entry.record.file,
            entry.record.category,
            entry.record.body.title()
        );
        println!("     updated {}: {}", entry.record.metadata.updated_at.format("%Y-%m-%d"), reasons.join("; "));
    }
    Ok(())
}
