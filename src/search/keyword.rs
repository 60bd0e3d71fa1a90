//! Inverted-index keyword search.
//!
//! # Scoring
//!
//! `score = w_cov·coverage + w_prox·proximity + w_q·quality_score`
//!
//! - **coverage**: IDF-weighted fraction of query terms present, with a
//!   saturating term-frequency factor and a penalty for fuzzy matches.
//! - **proximity**: inverse of the average minimum distance between
//!   consecutive matched query terms.
//! - **quality**: the record's stored quality score.
//!
//! Query terms with no exact postings fall back to vocabulary terms within a
//! small edit distance.
//!
//! # Rebuilds
//!
//! The index is rebuilt wholesale from a corpus snapshot and swapped in
//! atomically. Searches in flight keep the `Arc` they started with.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::config::RetrievalConfig;
use crate::error::{KnowledgeError, Result};
use crate::knowledge::corpus::Corpus;
use crate::knowledge::types::KnowledgeRecord;
use crate::search::analytics::{AnalyticsSnapshot, QueryAnalytics};
use crate::search::tokenize::{query_terms, tokenize};

/// Terms shorter than this never fuzzy-match.
const MIN_FUZZY_LEN: usize = 3;
/// Terms up to this length allow at most one edit.
const SHORT_TERM_LEN: usize = 4;
/// Coverage penalty per edit.
const FUZZY_PENALTY: f64 = 0.2;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct KeywordSearchOptions {
    pub max_results: usize,
    pub min_score: f64,
    /// Restrict results to one `file`.
    pub file_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordHit {
    pub record: Arc<KnowledgeRecord>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Records indexed.
    pub entries: usize,
    /// Distinct terms.
    pub terms: usize,
    /// Records skipped because they produced no tokens.
    pub skipped: usize,
}

/// Weights and fuzzy settings, taken from `[retrieval]`.
#[derive(Debug, Clone, Copy)]
pub struct KeywordScoring {
    pub coverage_weight: f64,
    pub proximity_weight: f64,
    pub quality_weight: f64,
    pub fuzzy_max_distance: usize,
}

impl KeywordScoring {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            coverage_weight: config.coverage_weight,
            proximity_weight: config.proximity_weight,
            quality_weight: config.quality_weight,
            fuzzy_max_distance: config.fuzzy_max_distance,
        }
    }

    fn max_distance_for(&self, term: &str) -> usize {
        let len = term.chars().count();
        if len < MIN_FUZZY_LEN {
            0
        } else if len <= SHORT_TERM_LEN {
            self.fuzzy_max_distance.min(1)
        } else {
            self.fuzzy_max_distance
        }
    }
}

impl Default for KeywordScoring {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

// ── Index structure ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct Posting {
    record_id: String,
    positions: Vec<u32>,
}

/// Immutable term → postings map plus the records it was built from.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<Posting>>,
    records: HashMap<String, Arc<KnowledgeRecord>>,
    skipped: usize,
}

impl InvertedIndex {
    /// Build from records. Duplicate ids are an [`KnowledgeError::IndexCorruption`].
    fn build(records: &[Arc<KnowledgeRecord>]) -> Result<Self> {
        let mut index = InvertedIndex::default();

        for record in records {
            if index.records.contains_key(&record.id) {
                return Err(KnowledgeError::IndexCorruption(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }

            let tokens = tokenize(&record.body.searchable_text());
            if tokens.is_empty() {
                tracing::warn!(id = %record.id, "record produced no tokens, skipping");
                index.skipped += 1;
                continue;
            }

            let mut per_term: HashMap<String, Vec<u32>> = HashMap::new();
            for token in tokens {
                per_term.entry(token.term).or_default().push(token.position);
            }
            for (term, positions) in per_term {
                index.postings.entry(term).or_default().push(Posting {
                    record_id: record.id.clone(),
                    positions,
                });
            }
            index.records.insert(record.id.clone(), Arc::clone(record));
        }

        Ok(index)
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.records.len(),
            terms: self.postings.len(),
            skipped: self.skipped,
        }
    }

    fn idf(&self, df: usize) -> f64 {
        let n = self.records.len() as f64;
        ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0
    }

    /// Exact postings for `term`, or fuzzy expansions when there are none.
    fn expand(&self, term: &str, scoring: &KeywordScoring) -> Vec<(&str, f64)> {
        if let Some((key, _)) = self.postings.get_key_value(term) {
            return vec![(key.as_str(), 1.0)];
        }
        let max = scoring.max_distance_for(term);
        if max == 0 {
            return Vec::new();
        }
        let len = term.chars().count();
        self.postings
            .keys()
            .filter(|candidate| candidate.chars().count().abs_diff(len) <= max)
            .filter_map(|candidate| {
                let distance = strsim::levenshtein(term, candidate);
                (distance <= max).then(|| (candidate.as_str(), 1.0 - FUZZY_PENALTY * distance as f64))
            })
            .collect()
    }

    fn search(&self, terms: &[String], options: &KeywordSearchOptions, scoring: &KeywordScoring) -> Vec<KeywordHit> {
        // Per query term: record id → (fuzz factor, positions of the chosen variant)
        let mut matches: Vec<HashMap<&str, (f64, &[u32])>> = Vec::with_capacity(terms.len());
        let mut idfs: Vec<f64> = Vec::with_capacity(terms.len());

        for term in terms {
            let mut per_record: HashMap<&str, (f64, &[u32])> = HashMap::new();
            let mut variants = self.expand(term, scoring);
            // Deterministic choice when several variants hit the same record
            variants.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

            for (variant, fuzz) in variants {
                let Some(postings) = self.postings.get(variant) else {
                    continue;
                };
                for posting in postings {
                    per_record
                        .entry(posting.record_id.as_str())
                        .and_modify(|(best_fuzz, best_positions)| {
                            if fuzz == *best_fuzz && posting.positions.len() > best_positions.len() {
                                *best_positions = posting.positions.as_slice();
                            }
                        })
                        .or_insert((fuzz, posting.positions.as_slice()));
                }
            }
            idfs.push(self.idf(per_record.len()));
            matches.push(per_record);
        }

        let idf_total: f64 = idfs.iter().sum();
        if idf_total <= 0.0 {
            return Vec::new();
        }

        let candidates: HashSet<&str> = matches.iter().flat_map(|m| m.keys().copied()).collect();
        let mut hits: Vec<KeywordHit> = Vec::new();

        for id in candidates {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if let Some(file) = &options.file_filter {
                if &record.file != file {
                    continue;
                }
            }

            let mut covered = 0.0;
            let mut matched_positions: Vec<&[u32]> = Vec::new();
            for (term_matches, idf) in matches.iter().zip(&idfs) {
                if let Some((fuzz, positions)) = term_matches.get(id) {
                    covered += idf * tf_saturation(positions.len()) * fuzz;
                    matched_positions.push(*positions);
                }
            }
            let coverage = covered / idf_total;
            let proximity = proximity(terms.len(), &matched_positions);

            let score = scoring.coverage_weight * coverage
                + scoring.proximity_weight * proximity
                + scoring.quality_weight * record.metadata.quality_score;

            if score >= options.min_score {
                hits.push(KeywordHit {
                    record: Arc::clone(record),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.record.metadata.quality_score.total_cmp(&a.record.metadata.quality_score))
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        hits.truncate(options.max_results);
        hits
    }
}

/// `1 − 0.5^(tf+1)`: 0.75 for one occurrence, approaching 1.
fn tf_saturation(tf: usize) -> f64 {
    1.0 - 0.5f64.powi(tf.min(64) as i32 + 1)
}

/// Smallest gap between any position in `a` and any in `b` (both sorted).
fn min_distance(a: &[u32], b: &[u32]) -> u32 {
    let (mut i, mut j) = (0, 0);
    let mut best = u32::MAX;
    while i < a.len() && j < b.len() {
        best = best.min(a[i].abs_diff(b[j]));
        if a[i] < b[j] {
            i += 1;
        } else {
            j += 1;
        }
    }
    best
}

fn proximity(query_len: usize, matched: &[&[u32]]) -> f64 {
    match matched.len() {
        0 => 0.0,
        1 => {
            if query_len == 1 {
                1.0
            } else {
                0.0
            }
        }
        _ => {
            let distances: Vec<f64> = matched
                .windows(2)
                .map(|pair| min_distance(pair[0], pair[1]).max(1) as f64)
                .collect();
            let avg = distances.iter().sum::<f64>() / distances.len() as f64;
            1.0 / avg
        }
    }
}

// ── Shared index handle ───────────────────────────────────────────────────────

/// Keyword index with atomic rebuild and query analytics.
pub struct KeywordIndex {
    current: RwLock<Arc<InvertedIndex>>,
    analytics: QueryAnalytics,
    scoring: KeywordScoring,
}

impl KeywordIndex {
    pub fn new(scoring: KeywordScoring) -> Self {
        Self {
            current: RwLock::new(Arc::new(InvertedIndex::default())),
            analytics: QueryAnalytics::new(),
            scoring,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(KeywordScoring::from_config(config))
    }

    fn snapshot(&self) -> Arc<InvertedIndex> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    fn swap(&self, index: InvertedIndex) {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(index);
    }

    /// Rebuild from the full corpus.
    pub fn index(&self, corpus: &Corpus) -> IndexStats {
        let records: Vec<Arc<KnowledgeRecord>> = corpus.records().cloned().collect();
        self.index_records(records)
    }

    /// Rebuild from an arbitrary record list.
    ///
    /// Duplicate ids trigger a full rebuild from a de-duplicated list where
    /// the highest `version` wins.
    pub fn index_records(&self, records: Vec<Arc<KnowledgeRecord>>) -> IndexStats {
        let index = match InvertedIndex::build(&records) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, "keyword index build failed, rebuilding from de-duplicated records");
                InvertedIndex::build(&dedupe_by_version(records)).unwrap_or_default()
            }
        };
        let stats = index.stats();
        self.swap(index);
        tracing::debug!(entries = stats.entries, terms = stats.terms, skipped = stats.skipped, "keyword index rebuilt");
        stats
    }

    /// Check the index covers exactly the corpus's (tokenizable) records.
    pub fn verify(&self, corpus: &Corpus) -> Result<()> {
        let index = self.snapshot();
        if index.records.len() + index.skipped != corpus.len() {
            return Err(KnowledgeError::IndexCorruption(format!(
                "index holds {} records ({} skipped), corpus has {}",
                index.records.len(),
                index.skipped,
                corpus.len()
            )));
        }
        for (id, indexed) in &index.records {
            match corpus.get(id) {
                Some(current) if current.metadata.version == indexed.metadata.version => {}
                Some(_) => {
                    return Err(KnowledgeError::IndexCorruption(format!("record {id} is out of date")));
                }
                None => {
                    return Err(KnowledgeError::IndexCorruption(format!("record {id} is not in the corpus")));
                }
            }
        }
        Ok(())
    }

    pub fn search(&self, query: &str, options: &KeywordSearchOptions) -> Vec<KeywordHit> {
        let terms = query_terms(query);
        let hits = if terms.is_empty() || options.max_results == 0 {
            Vec::new()
        } else {
            self.snapshot().search(&terms, options, &self.scoring)
        };
        self.analytics.record(query, &terms, hits.len());
        hits
    }

    pub fn stats(&self) -> IndexStats {
        self.snapshot().stats()
    }

    pub fn analytics(&self, limit: usize) -> AnalyticsSnapshot {
        self.analytics.snapshot(limit)
    }
}

fn dedupe_by_version(records: Vec<Arc<KnowledgeRecord>>) -> Vec<Arc<KnowledgeRecord>> {
    let mut latest: HashMap<String, Arc<KnowledgeRecord>> = HashMap::new();
    for record in records {
        match latest.get(&record.id) {
            Some(existing) if existing.metadata.version >= record.metadata.version => {}
            _ => {
                latest.insert(record.id.clone(), record);
            }
        }
    }
    let mut records: Vec<_> = latest.into_values().collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
}
