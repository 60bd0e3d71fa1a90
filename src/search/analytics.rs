//! Query analytics: volume, popular terms, and zero-result ("gap") queries.
//!
//! Gaps point at knowledge the corpus is missing. Term and gap tables are
//! bounded: past capacity the lowest-count entries are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::search::tokenize::normalize_text;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TermCount {
    pub term: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GapQuery {
    pub query: String,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_queries: u64,
    /// Most frequent query terms, highest count first.
    pub top_terms: Vec<TermCount>,
    /// Zero-result queries, most frequent first.
    pub gaps: Vec<GapQuery>,
}

#[derive(Default)]
struct AnalyticsState {
    total_queries: u64,
    term_counts: HashMap<String, u64>,
    gaps: HashMap<String, (u64, DateTime<Utc>)>,
}

/// Distinct terms (and, separately, gap queries) kept by default.
pub const DEFAULT_ANALYTICS_CAPACITY: usize = 4096;

pub struct QueryAnalytics {
    state: Mutex<AnalyticsState>,
    capacity: usize,
}

impl Default for QueryAnalytics {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ANALYTICS_CAPACITY)
    }
}

impl QueryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(AnalyticsState::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AnalyticsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one query with its parsed terms and how many hits it produced.
    pub fn record(&self, query: &str, terms: &[String], result_count: usize) {
        let mut state = self.lock();
        state.total_queries += 1;
        for term in terms {
            *state.term_counts.entry(term.clone()).or_insert(0) += 1;
        }
        prune(&mut state.term_counts, self.capacity, |&count| (count, None));

        if result_count == 0 {
            let key = normalize_text(query);
            if key.is_empty() {
                return;
            }
            let now = Utc::now();
            let entry = state.gaps.entry(key).or_insert((0, now));
            entry.0 += 1;
            entry.1 = now;
            prune(&mut state.gaps, self.capacity, |&(count, last_seen)| (count, Some(last_seen)));
        }
    }

    /// Top `limit` terms and gaps. Ties are broken alphabetically.
    pub fn snapshot(&self, limit: usize) -> AnalyticsSnapshot {
        let state = self.lock();

        let mut top_terms: Vec<TermCount> = state
            .term_counts
            .iter()
            .map(|(term, &count)| TermCount {
                term: term.clone(),
                count,
            })
            .collect();
        top_terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
        top_terms.truncate(limit);

        let mut gaps: Vec<GapQuery> = state
            .gaps
            .iter()
            .map(|(query, &(count, last_seen))| GapQuery {
                query: query.clone(),
                count,
                last_seen,
            })
            .collect();
        gaps.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        gaps.truncate(limit);

        AnalyticsSnapshot {
            total_queries: state.total_queries,
            top_terms,
            gaps,
        }
    }
}

/// Shrink `map` to three quarters of `capacity` once it exceeds it, keeping
/// the highest `(count, last_seen)` entries.
fn prune<V>(
    map: &mut HashMap<String, V>,
    capacity: usize,
    rank: impl Fn(&V) -> (u64, Option<DateTime<Utc>>),
) {
    if map.len() <= capacity {
        return;
    }
    let keep = (capacity * 3 / 4).max(1);
    let mut ranked: Vec<(String, (u64, Option<DateTime<Utc>>))> =
        map.iter().map(|(key, value)| (key.clone(), rank(value))).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let dropped = ranked.len() - keep;
    for (key, _) in ranked.into_iter().skip(keep) {
        map.remove(&key);
    }
    tracing::debug!(dropped, kept = map.len(), "analytics table pruned");
}
