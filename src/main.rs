use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lore::cli;
use lore::cli::ingest::{IngestArgs, UpdateArgs};
use lore::config::LoreConfig;
use lore::engine::SearchOptions;
use lore::search::SearchMode;

#[derive(Parser)]
#[command(name = "lore", version, about = "Self-learning knowledge base with hybrid search")]
struct Cli {
    /// Config file [default: ~/.lore/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the knowledge base
    ///
    /// Hybrid and vector modes embed the whole corpus first, one provider
    /// request per batch of records, because vectors are not kept between
    /// runs.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// hybrid, keyword, or vector [default: keyword with the ollama
        /// provider, hybrid otherwise]
        #[arg(long)]
        mode: Option<SearchMode>,
        /// Only return records from this knowledge file
        #[arg(long)]
        file: Option<String>,
        /// Print the raw search outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a record, merging it into a near-duplicate if one exists
    Ingest(IngestArgs),
    /// Change fields of an existing record
    Update(UpdateArgs),
    /// Remove a record
    Delete { id: String },
    /// Show corpus and index statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// List records that are old or tagged with a superseded domain version
    Stale {
        /// Age horizon in days [default: maintenance.stale_days]
        #[arg(long)]
        days: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Rebuild the keyword index and re-embed every record
    Reindex,
    /// Check database integrity and embedding provider health
    Doctor,
    /// Write all records as JSON Lines (`-` for stdout)
    Export { path: PathBuf },
    /// Ingest records from a JSON Lines file
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LoreConfig::load_from(path)?,
        None => LoreConfig::load()?,
    };

    // stdout carries command output; logs go to stderr.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search {
            query,
            limit,
            mode,
            file,
            json,
        } => {
            let mode = mode.unwrap_or_else(|| cli::search::default_mode(&config));
            let options = SearchOptions { limit, mode, file };
            cli::search::search(&config, &query, options, json).await?;
        }
        Command::Ingest(args) => cli::ingest::ingest(&config, args).await?,
        Command::Update(args) => cli::ingest::update(&config, args).await?,
        Command::Delete { id } => cli::ingest::delete(&config, &id).await?,
        Command::Stats { json } => cli::stats::stats(&config, json).await?,
        Command::Stale { days, json } => cli::stats::stale(&config, days, json).await?,
        Command::Reindex => cli::reindex::reindex(&config).await?,
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Export { path } => cli::export::export(&config, &path)?,
        Command::Import { path } => cli::import::import(&config, &path).await?,
    }

    Ok(())
}
