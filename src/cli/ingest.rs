//! CLI `ingest`, `update` and `delete` commands.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};

use crate::config::LoreConfig;
use crate::knowledge::store::{IngestRequest, RecordPatch};
use crate::knowledge::types::{CodeSample, RecordBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BodyKind {
    Article,
    Qa,
    Entry,
}

impl BodyKind {
    fn of(body: &RecordBody) -> Self {
        match body {
            RecordBody::Article { .. } => Self::Article,
            RecordBody::Qa { .. } => Self::Qa,
            RecordBody::Entry { .. } => Self::Entry,
        }
    }
}

/// Body fields shared by `ingest` and `update`. `--title`/`--text` map to
/// question/answer for `qa` and name/description for `entry`.
#[derive(Debug, Clone, Default, Args)]
pub struct BodyArgs {
    /// Body kind [default: article, or the current kind on update]
    #[arg(long, value_enum)]
    pub kind: Option<BodyKind>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub text: Option<String>,
    /// Attach a code sample (repeatable)
    #[arg(long = "code")]
    pub code: Vec<String>,
    /// Language for every `--code` sample
    #[arg(long)]
    pub language: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

impl BodyArgs {
    fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.title.is_none()
            && self.text.is_none()
            && self.code.is_empty()
            && self.tags.is_empty()
    }

    /// Build a body, taking anything not given on the command line from
    /// `current`.
    fn into_body(self, current: Option<&RecordBody>) -> RecordBody {
        let canonical = current.map(RecordBody::canonical);
        let kind = self
            .kind
            .or(current.map(BodyKind::of))
            .unwrap_or(BodyKind::Article);
        let title = self
            .title
            .or_else(|| canonical.as_ref().map(|c| c.title.clone()))
            .unwrap_or_default();
        let text = self
            .text
            .or_else(|| canonical.as_ref().map(|c| c.text.clone()))
            .unwrap_or_default();

        let code_samples = if self.code.is_empty() {
            current.map(|b| b.code_samples().to_vec()).unwrap_or_default()
        } else {
            let language = self.language;
            self.code
                .into_iter()
                .map(|code| CodeSample {
                    language: language.clone(),
                    code,
                })
                .collect()
        };
        let tags = if self.tags.is_empty() {
            current.map(|b| b.tags().to_vec()).unwrap_or_default()
        } else {
            self.tags
        };

        match kind {
            BodyKind::Article => RecordBody::Article {
                title,
                text,
                code_samples,
                tags,
            },
            BodyKind::Qa => RecordBody::Qa {
                question: title,
                answer: text,
                code_samples,
                tags,
            },
            BodyKind::Entry => RecordBody::Entry {
                name: title,
                description: text,
                code_samples,
                tags,
            },
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Knowledge file the record belongs to
    #[arg(long)]
    pub file: String,
    #[arg(long)]
    pub category: String,
    #[command(flatten)]
    pub body: BodyArgs,
    #[arg(long, default_value = "user")]
    pub source: String,
    #[arg(long)]
    pub verified: bool,
    #[arg(long)]
    pub domain_version: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub category: Option<String>,
    #[command(flatten)]
    pub body: BodyArgs,
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub verified: Option<bool>,
    #[arg(long)]
    pub domain_version: Option<String>,
}

pub async fn ingest(config: &LoreConfig, args: IngestArgs) -> Result<()> {
    let engine = super::open_engine(config)?;
    let request = IngestRequest {
        file: args.file,
        category: args.category,
        body: args.body.into_body(None),
        source: args.source,
        verified: args.verified,
        domain_version: args.domain_version,
    };

    let outcome = engine.ingest(request).await?;
    let record = &outcome.record;
    if outcome.merged {
        println!(
            "Merged into {} (similarity {:.2}), now version {}.",
            record.id,
            outcome.similarity.unwrap_or_default(),
            record.metadata.version
        );
    } else {
        println!("Created {}.", record.id);
    }
    println!("Quality score: {:.2}", outcome.quality_score);
    Ok(())
}

pub async fn update(config: &LoreConfig, args: UpdateArgs) -> Result<()> {
    let engine = super::open_engine(config)?;

    let body = if args.body.is_empty() {
        None
    } else {
        let Some(current) = engine.get(&args.id) else {
            bail!("record not found: {}", args.id);
        };
        Some(args.body.into_body(Some(&current.body)))
    };

    let patch = RecordPatch {
        body,
        category: args.category,
        source: args.source,
        verified: args.verified,
        domain_version: args.domain_version,
    };

    let record = engine.update(&args.id, patch).await?;
    println!(
        "Updated {} to version {} (quality {:.2}).",
        record.id, record.metadata.version, record.metadata.quality_score
    );
    Ok(())
}

pub async fn delete(config: &LoreConfig, id: &str) -> Result<()> {
    let engine = super::open_engine(config)?;
    let removed = engine.delete(id).await?;
    println!("Deleted {} ({}).", removed.id, removed.body.title());
    Ok(())
}
