//! CLI `doctor` command — run diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::LoreConfig;

/// Run database and provider diagnostics and print a health report.
pub async fn doctor(config: &LoreConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `lore ingest` or `lore import` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let engine = super::open_engine(config).context("failed to open database (may be corrupt)")?;
    let report = engine.health().await.context("failed to run health check")?;

    println!("Lore Health Report");
    println!("==================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Records:         {}", report.record_count);
    println!("  Audit log:       {}", report.log_count);
    println!();

    println!("Embedding provider:");
    println!("  Configured:      {} ({})", config.embedding.provider, config.embedding.model);
    match engine.probe_provider().await {
        None => println!("  Status:          disabled (keyword-only search)"),
        Some(Ok(dimension)) => println!("  Status:          OK ({dimension}-d vectors)"),
        Some(Err(e)) => {
            println!("  Status:          UNAVAILABLE ({e})");
            println!("  Searches fall back to keyword-only results until it recovers.");
        }
    }
    println!();

    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Or export from a good copy and reimport:");
        println!("     lore export backup.jsonl");
        println!("     lore import backup.jsonl");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
