//! Terminal front-end for the `lore` binary. Each submodule implements one
//! subcommand on top of [`KnowledgeEngine`].

pub mod doctor;
pub mod export;
pub mod import;
pub mod ingest;
pub mod reindex;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::LoreConfig;
use crate::engine::KnowledgeEngine;

/// Open the engine for a one-shot command.
pub fn open_engine(config: &LoreConfig) -> Result<KnowledgeEngine> {
    KnowledgeEngine::open(config).with_context(|| {
        format!(
            "failed to open knowledge base at {}",
            config.resolved_db_path().display()
        )
    })
}

/// Bar styled like the rest of the CLI; hidden when `len` is zero.
pub(crate) fn progress_bar(len: usize) -> Result<ProgressBar> {
    if len == 0 {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .context("invalid progress template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

/// First `max` characters of `text` on one line, with an ellipsis if cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{cut}...")
}
