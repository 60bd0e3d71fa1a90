//! Write path: validation, near-duplicate merge, versioning, quality scoring,
//! persistence, and audit logging.
//!
//! Every mutation runs inside a SQLite transaction together with its audit
//! entry. The new corpus snapshot is published only after the commit, so
//! readers never observe a record that is not durable.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LoreConfig;
use crate::error::{KnowledgeError, Result};
use crate::knowledge::corpus::{Corpus, CorpusHandle};
use crate::knowledge::dedup;
use crate::knowledge::persist::{self, LogEntry, LogOperation};
use crate::knowledge::quality::QualityScorer;
use crate::knowledge::staleness::{self, StaleRecord};
use crate::knowledge::types::{HistoryEntry, KnowledgeRecord, RecordBody, RecordMetadata};

/// Provenance used when an ingest request leaves `source` blank.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// A new piece of knowledge, from a user or the harvester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub file: String,
    pub category: String,
    pub body: RecordBody,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub domain_version: Option<String>,
}

/// Result of [`KnowledgeStore::ingest`].
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// The record as stored (new, or the merged existing record).
    pub record: KnowledgeRecord,
    /// `true` if the request was folded into a near-duplicate.
    pub merged: bool,
    pub quality_score: f64,
    /// Similarity to the record it merged into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Partial update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default)]
    pub body: Option<RecordBody>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub domain_version: Option<String>,
}

impl RecordPatch {
    fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.category.is_none()
            && self.source.is_none()
            && self.verified.is_none()
            && self.domain_version.is_none()
    }
}

/// Owner of the durable corpus.
pub struct KnowledgeStore {
    conn: Connection,
    corpus: CorpusHandle,
    scorer: QualityScorer,
    dedup_threshold: f64,
    history_limit: usize,
    stale_days: u64,
    superseded_domain_versions: Vec<String>,
}

fn require_non_empty(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(KnowledgeError::Validation(format!("`{field}` must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn clean_domain_version(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl KnowledgeStore {
    /// Load every persisted record and publish it as the initial corpus.
    pub fn open(conn: Connection, config: &LoreConfig) -> Result<Self> {
        let records = persist::load_all(&conn)?;
        tracing::info!(records = records.len(), "corpus loaded");

        Ok(Self {
            conn,
            corpus: CorpusHandle::new(Corpus::from_records(records)),
            scorer: QualityScorer::new(&config.knowledge),
            dedup_threshold: config.knowledge.dedup_threshold,
            history_limit: config.knowledge.history_limit.max(1),
            stale_days: config.maintenance.stale_days,
            superseded_domain_versions: config.maintenance.superseded_domain_versions.clone(),
        })
    }

    /// Shared handle the indexes read from.
    pub fn corpus(&self) -> CorpusHandle {
        self.corpus.clone()
    }

    pub fn snapshot(&self) -> Arc<Corpus> {
        self.corpus.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<Arc<KnowledgeRecord>> {
        self.corpus.snapshot().get(id).cloned()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    pub fn audit_log(&self, id: &str) -> Result<Vec<LogEntry>> {
        persist::audit_log(&self.conn, id)
    }

    pub fn ingest(&mut self, request: IngestRequest) -> Result<IngestOutcome> {
        self.ingest_at(request, Utc::now())
    }

    /// Ingest with an explicit clock.
    ///
    /// A near-duplicate in the same partition is merged instead of creating a
    /// new record; otherwise a new record is created at version 1.
    pub fn ingest_at(&mut self, request: IngestRequest, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let file = require_non_empty(&request.file, "file")?;
        let category = require_non_empty(&request.category, "category")?;
        let body = request.body.normalized();
        body.validate()?;
        let source = match request.source.trim() {
            "" => UNKNOWN_SOURCE.to_string(),
            s => s.to_string(),
        };
        let domain_version = clean_domain_version(request.domain_version);

        let snapshot = self.corpus.snapshot();
        match dedup::find_near_duplicate(&snapshot, &file, &category, &body, self.dedup_threshold) {
            Some((existing, similarity)) => {
                let incoming = Incoming {
                    body,
                    source,
                    verified: request.verified,
                    domain_version,
                };
                self.merge(&snapshot, &existing, incoming, similarity, now)
            }
            None => self.create(&snapshot, file, category, body, source, request.verified, domain_version, now),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        snapshot: &Corpus,
        file: String,
        category: String,
        body: RecordBody,
        source: String,
        verified: bool,
        domain_version: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let mut record = KnowledgeRecord {
            id: uuid::Uuid::now_v7().to_string(),
            file,
            category,
            body,
            metadata: RecordMetadata {
                source,
                created_at: now,
                updated_at: now,
                usage_count: 0,
                verified,
                quality_score: 0.0,
                version: 1,
                domain_version,
                history: Vec::new(),
            },
        };
        let quality = self.recompute_quality(&mut record, now);

        let tx = self.conn.transaction()?;
        persist::upsert_record(&tx, &record)?;
        persist::write_audit_log(
            &tx,
            LogOperation::Create,
            &record.id,
            Some(&serde_json::json!({"file": record.file, "category": record.category})),
        )?;
        tx.commit()?;

        self.publish_with(snapshot, record.clone());
        tracing::info!(id = %record.id, file = %record.file, quality, "record created");

        Ok(IngestOutcome {
            record,
            merged: false,
            quality_score: quality,
            similarity: None,
        })
    }

    /// Fold an incoming version into `existing`. The higher-quality version
    /// at `now` becomes the body; ties go to the incoming version.
    fn merge(
        &mut self,
        snapshot: &Corpus,
        existing: &KnowledgeRecord,
        incoming: Incoming,
        similarity: f64,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let existing_quality = self.scorer.score(&existing.metadata, now);
        let incoming_meta = RecordMetadata {
            source: incoming.source.clone(),
            created_at: now,
            updated_at: now,
            usage_count: 0,
            verified: incoming.verified,
            quality_score: 0.0,
            version: 1,
            domain_version: incoming.domain_version.clone(),
            history: Vec::new(),
        };
        let incoming_quality = self.scorer.score(&incoming_meta, now);
        let incoming_wins = incoming_quality >= existing_quality;

        let mut merged = existing.clone();
        if incoming_wins {
            let loser = existing.snapshot();
            merged.body = incoming.body;
            merged.metadata.source = incoming.source;
            merged.metadata.domain_version = incoming.domain_version.or(existing.metadata.domain_version.clone());
            merged.push_history(loser, self.history_limit);
        } else {
            let loser = HistoryEntry {
                body: incoming.body,
                quality_score: incoming_quality,
                source: incoming.source,
                timestamp: now,
            };
            if merged.metadata.domain_version.is_none() {
                merged.metadata.domain_version = incoming.domain_version;
            }
            merged.push_history(loser, self.history_limit);
        }
        merged.metadata.version = existing.metadata.version.saturating_add(1);
        merged.metadata.updated_at = now;
        merged.metadata.verified = existing.metadata.verified || incoming.verified;
        let quality = self.recompute_quality(&mut merged, now);

        let tx = self.conn.transaction()?;
        persist::upsert_record(&tx, &merged)?;
        persist::write_audit_log(
            &tx,
            LogOperation::Merge,
            &merged.id,
            Some(&serde_json::json!({
                "similarity": similarity,
                "winner": if incoming_wins { "incoming" } else { "existing" },
                "version": merged.metadata.version,
            })),
        )?;
        tx.commit()?;

        self.publish_with(snapshot, merged.clone());
        tracing::info!(
            id = %merged.id,
            similarity,
            version = merged.metadata.version,
            incoming_wins,
            "near-duplicate merged"
        );

        Ok(IngestOutcome {
            record: merged,
            merged: true,
            quality_score: quality,
            similarity: Some(similarity),
        })
    }

    pub fn update(&mut self, id: &str, patch: RecordPatch) -> Result<KnowledgeRecord> {
        self.update_at(id, patch, Utc::now())
    }

    /// Apply `patch` to an existing record. A body change moves the previous
    /// body into history. Every accepted update bumps the version.
    pub fn update_at(&mut self, id: &str, patch: RecordPatch, now: DateTime<Utc>) -> Result<KnowledgeRecord> {
        if patch.is_empty() {
            return Err(KnowledgeError::Validation("update contains no changes".into()));
        }
        let snapshot = self.corpus.snapshot();
        let current = snapshot
            .get(id)
            .ok_or_else(|| KnowledgeError::NotFound(id.to_string()))?;

        let mut record = KnowledgeRecord::clone(current);
        let mut changed = Vec::new();

        if let Some(body) = patch.body {
            let body = body.normalized();
            body.validate()?;
            if body != record.body {
                let previous = record.snapshot();
                record.body = body;
                record.push_history(previous, self.history_limit);
                changed.push("body");
            }
        }
        if let Some(category) = patch.category {
            let category = require_non_empty(&category, "category")?;
            if category != record.category {
                record.category = category;
                changed.push("category");
            }
        }
        if let Some(source) = patch.source {
            let source = require_non_empty(&source, "source")?;
            if source != record.metadata.source {
                record.metadata.source = source;
                changed.push("source");
            }
        }
        if let Some(verified) = patch.verified {
            if verified != record.metadata.verified {
                record.metadata.verified = verified;
                changed.push("verified");
            }
        }
        if let Some(domain_version) = patch.domain_version {
            let domain_version = clean_domain_version(Some(domain_version));
            if domain_version != record.metadata.domain_version {
                record.metadata.domain_version = domain_version;
                changed.push("domain_version");
            }
        }

        record.metadata.version = record.metadata.version.saturating_add(1);
        record.metadata.updated_at = now;
        self.recompute_quality(&mut record, now);

        let tx = self.conn.transaction()?;
        persist::upsert_record(&tx, &record)?;
        persist::write_audit_log(
            &tx,
            LogOperation::Update,
            &record.id,
            Some(&serde_json::json!({"changed": changed, "version": record.metadata.version})),
        )?;
        tx.commit()?;

        self.publish_with(&snapshot, record.clone());
        tracing::info!(id = %record.id, version = record.metadata.version, changed = ?changed, "record updated");
        Ok(record)
    }

    /// Remove a record permanently.
    pub fn delete(&mut self, id: &str) -> Result<KnowledgeRecord> {
        let snapshot = self.corpus.snapshot();
        let current = snapshot
            .get(id)
            .ok_or_else(|| KnowledgeError::NotFound(id.to_string()))?;
        let removed = KnowledgeRecord::clone(current);

        let tx = self.conn.transaction()?;
        if !persist::delete_record(&tx, id)? {
            return Err(KnowledgeError::NotFound(id.to_string()));
        }
        persist::write_audit_log(
            &tx,
            LogOperation::Delete,
            id,
            Some(&serde_json::json!({"version": removed.metadata.version})),
        )?;
        tx.commit()?;

        let mut next = (*snapshot).clone();
        next.remove(id);
        self.corpus.publish(next);
        tracing::info!(id, "record deleted");
        Ok(removed)
    }

    /// Best near-duplicate of `body` in the `file`/`category` partition.
    pub fn find_near_duplicate(
        &self,
        file: &str,
        category: &str,
        body: &RecordBody,
    ) -> Option<(Arc<KnowledgeRecord>, f64)> {
        let snapshot = self.corpus.snapshot();
        dedup::find_near_duplicate(&snapshot, file, category, body, self.dedup_threshold)
    }

    /// Re-score `record` at `now` and store the result on it.
    pub fn recompute_quality(&self, record: &mut KnowledgeRecord, now: DateTime<Utc>) -> f64 {
        let quality = self.scorer.score(&record.metadata, now);
        record.metadata.quality_score = quality;
        quality
    }

    /// Count one retrieval for each id; an id listed twice counts twice.
    /// Unknown ids are skipped.
    pub fn record_usage(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut next = Corpus::clone(&self.corpus.snapshot());
        let mut bumped = 0;

        let tx = self.conn.transaction()?;
        for id in ids {
            let Some(current) = next.get(id) else {
                continue;
            };
            let mut record = KnowledgeRecord::clone(current);
            record.metadata.usage_count = record.metadata.usage_count.saturating_add(1);
            let quality = self.scorer.score(&record.metadata, now);
            record.metadata.quality_score = quality;

            persist::update_usage(&tx, &record)?;
            persist::write_audit_log(
                &tx,
                LogOperation::Usage,
                id,
                Some(&serde_json::json!({"usage_count": record.metadata.usage_count})),
            )?;
            next.insert(record);
            bumped += 1;
        }
        tx.commit()?;

        if bumped > 0 {
            self.corpus.publish(next);
            tracing::debug!(count = bumped, "usage recorded");
        }
        Ok(bumped)
    }

    /// Stale records using the configured horizon unless one is given.
    pub fn stale_records(&self, horizon_days: Option<u64>) -> Vec<StaleRecord> {
        let horizon = horizon_days.unwrap_or(self.stale_days);
        staleness::stale_records(
            &self.corpus.snapshot(),
            horizon,
            &self.superseded_domain_versions,
            Utc::now(),
        )
    }

    fn publish_with(&self, base: &Corpus, record: KnowledgeRecord) {
        let mut next = base.clone();
        next.insert(record);
        self.corpus.publish(next);
    }
}

struct Incoming {
    body: RecordBody,
    source: String,
    verified: bool,
    domain_version: Option<String>,
}
