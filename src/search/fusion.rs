//! Hybrid retrieval with weighted Reciprocal Rank Fusion.
//!
//! Each source contributes `weight / (k + rank)` per record (rank 1-based).
//! Records found by both sources sum their contributions. Ordering is fused
//! score descending, then raw keyword score descending, then id ascending.

use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::knowledge::corpus::CorpusHandle;
use crate::knowledge::types::KnowledgeRecord;
use crate::search::keyword::{KeywordHit, KeywordIndex, KeywordSearchOptions};
use crate::search::vector::{VectorIndex, VectorSearchOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Hybrid,
    KeywordOnly,
    VectorOnly,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(Self::Hybrid),
            "keyword" | "keyword_only" => Ok(Self::KeywordOnly),
            "vector" | "vector_only" => Ok(Self::VectorOnly),
            other => Err(format!("unknown search mode: {other}. Supported: hybrid, keyword, vector")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Both,
    Keyword,
    Vector,
}

#[derive(Debug, Clone)]
pub struct FusionOptions {
    pub limit: usize,
    pub mode: SearchMode,
    pub file_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    pub record: Arc<KnowledgeRecord>,
    pub match_type: MatchType,
    pub fused_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
}

/// Zero hits is a normal outcome, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Matches { results: Vec<FusedResult> },
    NoResults { query: String },
}

impl SearchOutcome {
    pub fn results(&self) -> &[FusedResult] {
        match self {
            Self::Matches { results } => results,
            Self::NoResults { .. } => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results().is_empty()
    }
}

/// RRF constants and per-source search thresholds.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub k: usize,
    pub keyword_weight: f64,
    pub vector_weight: f64,
    pub candidate_multiplier: usize,
    pub keyword_min_score: f64,
    pub vector_min_score: f64,
}

impl FusionWeights {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            k: config.rrf_k,
            keyword_weight: config.keyword_weight,
            vector_weight: config.vector_weight,
            candidate_multiplier: config.candidate_multiplier.max(1),
            keyword_min_score: config.min_score,
            vector_min_score: config.vector_min_score,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

// ── Pure fusion ───────────────────────────────────────────────────────────────

struct Accumulator {
    record: Arc<KnowledgeRecord>,
    fused: f64,
    keyword_score: Option<f64>,
    vector_score: Option<f64>,
}

/// Fuse two ranked lists. `vector` pairs are `(record, rescaled score)`.
pub fn fuse(
    keyword: &[KeywordHit],
    vector: &[(Arc<KnowledgeRecord>, f64)],
    weights: &FusionWeights,
    limit: usize,
) -> Vec<FusedResult> {
    let k = weights.k as f64;
    let mut merged: HashMap<&str, Accumulator> = HashMap::new();

    for (rank, hit) in keyword.iter().enumerate() {
        let contribution = weights.keyword_weight / (k + (rank + 1) as f64);
        let entry = merged.entry(hit.record.id.as_str()).or_insert_with(|| Accumulator {
            record: Arc::clone(&hit.record),
            fused: 0.0,
            keyword_score: None,
            vector_score: None,
        });
        entry.fused += contribution;
        entry.keyword_score = Some(hit.score);
    }

    for (rank, (record, score)) in vector.iter().enumerate() {
        let contribution = weights.vector_weight / (k + (rank + 1) as f64);
        let entry = merged.entry(record.id.as_str()).or_insert_with(|| Accumulator {
            record: Arc::clone(record),
            fused: 0.0,
            keyword_score: None,
            vector_score: None,
        });
        entry.fused += contribution;
        entry.vector_score = Some(*score);
    }

    let mut results: Vec<FusedResult> = merged
        .into_values()
        .map(|acc| FusedResult {
            match_type: match (acc.keyword_score.is_some(), acc.vector_score.is_some()) {
                (true, true) => MatchType::Both,
                (true, false) => MatchType::Keyword,
                _ => MatchType::Vector,
            },
            record: acc.record,
            fused_score: acc.fused,
            keyword_score: acc.keyword_score,
            vector_score: acc.vector_score,
        })
        .collect();

    results.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| {
                let ka = a.keyword_score.unwrap_or(f64::NEG_INFINITY);
                let kb = b.keyword_score.unwrap_or(f64::NEG_INFINITY);
                kb.total_cmp(&ka)
            })
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    results.truncate(limit);
    results
}

// ── Search orchestration ──────────────────────────────────────────────────────

pub struct FusionSearch {
    keyword: Arc<KeywordIndex>,
    vector: Arc<VectorIndex>,
    corpus: CorpusHandle,
    weights: FusionWeights,
}

impl FusionSearch {
    pub fn new(
        keyword: Arc<KeywordIndex>,
        vector: Arc<VectorIndex>,
        corpus: CorpusHandle,
        weights: FusionWeights,
    ) -> Self {
        Self {
            keyword,
            vector,
            corpus,
            weights,
        }
    }

    /// Run both sources concurrently and fuse. Vector hits whose record is
    /// not in the current corpus are dropped.
    pub async fn search(&self, query: &str, options: &FusionOptions) -> SearchOutcome {
        let candidates = options.limit.saturating_mul(self.weights.candidate_multiplier);
        let run_keyword = options.mode != SearchMode::VectorOnly;
        let run_vector = options.mode != SearchMode::KeywordOnly;

        let keyword_future = async {
            if !run_keyword || candidates == 0 {
                return Vec::new();
            }
            let index = Arc::clone(&self.keyword);
            let query = query.to_string();
            let opts = KeywordSearchOptions {
                max_results: candidates,
                min_score: self.weights.keyword_min_score,
                file_filter: options.file_filter.clone(),
            };
            match tokio::task::spawn_blocking(move || index.search(&query, &opts)).await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::error!(error = %e, "keyword search task failed");
                    Vec::new()
                }
            }
        };

        let vector_future = async {
            if !run_vector || candidates == 0 {
                return Vec::new();
            }
            let opts = VectorSearchOptions {
                top_k: candidates,
                min_score: self.weights.vector_min_score,
            };
            self.vector.search(query, &opts).await
        };

        let (keyword_hits, vector_hits) = tokio::join!(keyword_future, vector_future);

        let snapshot = self.corpus.snapshot();
        let vector_ranked: Vec<(Arc<KnowledgeRecord>, f64)> = vector_hits
            .into_iter()
            .filter_map(|hit| {
                let record = snapshot.get(&hit.record_id)?;
                if let Some(file) = &options.file_filter {
                    if &record.file != file {
                        return None;
                    }
                }
                Some((Arc::clone(record), hit.score))
            })
            .collect();

        tracing::debug!(
            query,
            keyword = keyword_hits.len(),
            vector = vector_ranked.len(),
            "fusing results"
        );

        let results = fuse(&keyword_hits, &vector_ranked, &self.weights, options.limit);
        if results.is_empty() {
            SearchOutcome::NoResults {
                query: query.to_string(),
            }
        } else {
            SearchOutcome::Matches { results }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::{RecordBody, RecordMetadata};
    use chrono::Utc;

    fn record(id: &str) -> Arc<KnowledgeRecord> {
        let now = Utc::now();
        Arc::new(KnowledgeRecord {
            id: id.into(),
            file: "f".into(),
            category: "c".into(),
            body: RecordBody::article(id, "text"),
            metadata: RecordMetadata {
                source: "docs".into(),
                created_at: now,
                updated_at: now,
                usage_count: 0,
                verified: false,
                quality_score: 0.5,
                version: 1,
                domain_version: None,
                history: Vec::new(),
            },
        })
    }

    fn kw(ids: &[(&str, f64)]) -> Vec<KeywordHit> {
        ids.iter()
            .map(|(id, score)| KeywordHit {
                record: record(id),
                score: *score,
            })
            .collect()
    }

    fn vec_hits(ids: &[&str]) -> Vec<(Arc<KnowledgeRecord>, f64)> {
        ids.iter().map(|id| (record(id), 0.9)).collect()
    }

    #[test]
    fn test_both_sources_outrank_single() {
        let keyword = kw(&[("a", 0.9), ("b", 0.8)]);
        let vector = vec_hits(&["c", "a"]);
        let fused = fuse(&keyword, &vector, &FusionWeights::default(), 10);

        assert_eq!(fused[0].record.id, "a");
        assert_eq!(fused[0].match_type, MatchType::Both);
        let expected = 0.4 / 61.0 + 0.6 / 62.0;
        assert!((fused[0].fused_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_single_source_scaled_by_weight() {
        let fused = fuse(&kw(&[("a", 0.9)]), &[], &FusionWeights::default(), 10);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].match_type, MatchType::Keyword);
        assert!((fused[0].fused_score - 0.4 / 61.0).abs() < 1e-12);

        let fused = fuse(&[], &vec_hits(&["z"]), &FusionWeights::default(), 10);
        assert_eq!(fused[0].match_type, MatchType::Vector);
        assert!((fused[0].fused_score - 0.6 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_break_on_keyword_score_then_id() {
        let weights = FusionWeights {
            keyword_weight: 0.5,
            vector_weight: 0.5,
            ..FusionWeights::default()
        };
        // Equal fused scores; only "b" has a keyword score
        let fused = fuse(&kw(&[("b", 0.3)]), &vec_hits(&["a"]), &weights, 10);
        assert_eq!(fused[0].fused_score, fused[1].fused_score);
        assert_eq!(fused[0].record.id, "b");

        // a: keyword rank 2 + vector rank 1, b: keyword rank 1 + vector rank 2
        let keyword = kw(&[("b", 0.5), ("a", 0.5)]);
        let both = fuse(&keyword, &vec_hits(&["a", "b"]), &weights, 10);
        assert_eq!(both[0].fused_score, both[1].fused_score);
        assert_eq!(both[0].record.id, "a");
    }

    #[test]
    fn test_truncates_to_limit() {
        let fused = fuse(&kw(&[("a", 0.9), ("b", 0.8), ("c", 0.7)]), &[], &FusionWeights::default(), 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_adding_agreeing_vector_hit_never_lowers_rank() {
        let keyword = kw(&[("a", 0.9), ("b", 0.8), ("c", 0.7)]);
        let before = fuse(&keyword, &vec_hits(&["x"]), &FusionWeights::default(), 10);
        let after = fuse(&keyword, &vec_hits(&["x", "c"]), &FusionWeights::default(), 10);

        let rank = |list: &[FusedResult]| list.iter().position(|r| r.record.id == "c").unwrap();
        assert!(rank(&after) <= rank(&before));
    }

    #[test]
    fn test_search_mode_parsing() {
        assert_eq!("hybrid".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert_eq!("keyword".parse::<SearchMode>().unwrap(), SearchMode::KeywordOnly);
        assert_eq!("vector_only".parse::<SearchMode>().unwrap(), SearchMode::VectorOnly);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_outcome_helpers() {
        let none = SearchOutcome::NoResults { query: "q".into() };
        assert!(none.is_empty());
        let json = serde_json::to_value(&none).unwrap();
        assert_eq!(json["status"], "no_results");
    }
}
