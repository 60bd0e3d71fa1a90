//! Stale-record classification. Read-only: nothing here removes records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::knowledge::corpus::Corpus;
use crate::knowledge::types::KnowledgeRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StaleReason {
    /// Not updated within the horizon.
    Age { days: i64 },
    /// Written against a domain release that has been superseded.
    SupersededDomainVersion { tag: String },
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Age { days } => write!(f, "not updated for {days} days"),
            Self::SupersededDomainVersion { tag } => write!(f, "domain version {tag} superseded"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StaleRecord {
    pub record: Arc<KnowledgeRecord>,
    pub reasons: Vec<StaleReason>,
}

/// Reasons `record` is stale, empty if it is current.
pub fn classify(
    record: &KnowledgeRecord,
    horizon_days: u64,
    superseded: &[String],
    now: DateTime<Utc>,
) -> Vec<StaleReason> {
    let mut reasons = Vec::new();

    let age_days = (now - record.metadata.updated_at).num_days();
    if age_days > horizon_days as i64 {
        reasons.push(StaleReason::Age { days: age_days });
    }

    if let Some(tag) = &record.metadata.domain_version {
        if superseded.iter().any(|s| s == tag) {
            reasons.push(StaleReason::SupersededDomainVersion { tag: tag.clone() });
        }
    }

    reasons
}

/// Every stale record in the corpus, oldest `updated_at` first.
pub fn stale_records(
    corpus: &Corpus,
    horizon_days: u64,
    superseded: &[String],
    now: DateTime<Utc>,
) -> Vec<StaleRecord> {
    let mut stale: Vec<StaleRecord> = corpus
        .records()
        .filter_map(|record| {
            let reasons = classify(record, horizon_days, superseded, now);
            (!reasons.is_empty()).then(|| StaleRecord {
                record: Arc::clone(record),
                reasons,
            })
        })
        .collect();

    stale.sort_by(|a, b| {
        a.record
            .metadata
            .updated_at
            .cmp(&b.record.metadata.updated_at)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    stale
}
