use anyhow::Result;

use crate::config::LoreConfig;
use crate::engine::SearchOptions;
use crate::search::fusion::{MatchType, SearchMode, SearchOutcome};

/// Mode used when `--mode` is not given. A remote provider would be asked to
/// embed the whole corpus on every invocation, so it defaults to keyword.
pub fn default_mode(config: &LoreConfig) -> SearchMode {
    match config.embedding.provider.as_str() {
        "ollama" => SearchMode::KeywordOnly,
        _ => SearchMode::Hybrid,
    }
}

/// Run a one-shot search from the terminal.
///
/// Vectors live in process memory, so a fresh CLI process embeds the corpus
/// first unless the mode is keyword-only.
pub async fn search(config: &LoreConfig, query: &str, options: SearchOptions, json: bool) -> Result<()> {
    let engine = super::open_engine(config)?;

    if options.mode != SearchMode::KeywordOnly && engine.provider_name().is_some() {
        tracing::info!(records = engine.snapshot().len(), "embedding corpus before search");
        let summary = engine.reindex(&|_: usize| {}).await?;
        if let Some(report) = summary.vector.as_ref().filter(|r| !r.failed.is_empty()) {
            tracing::warn!(failed = report.failed.len(), "some records could not be embedded");
        }
    }

    let outcome = engine.search(query, &options).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let results = match &outcome {
        SearchOutcome::NoResults { .. } => {
            println!("No results found.");
            return Ok(());
        }
        SearchOutcome::Matches { results } => results,
    };

    println!("Found {} result(s)\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let record = &result.record;
        let matched = match result.match_type {
            MatchType::Both => "both",
            MatchType::Keyword => "keyword",
            MatchType::Vector => "vector",
        };
        println!(
            "  {}. [{}/{}] {} (quality: {:.2}, score: {:.4}, via {matched})",
            i + 1,
            record.file,
            record.category,
            record.body.title(),
            record.quality_score(),
            result.fused_score,
        );
        println!("     id: {}", record.id);
        println!("     {}", super::preview(&record.canonical().text, 120));
        println!();
    }

    Ok(())
}
