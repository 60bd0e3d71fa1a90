//! Engine facade: owns the store behind a mutation lock and keeps the keyword
//! and vector indexes in step with every change.
//!
//! Mutations hold the lock through the reindex path, so an `ingest` returns
//! only once its record is durable and searchable. Searches never wait on the
//! lock: usage bumps are queued and applied by whoever holds it next.

use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cache::{spawn_sweeper, Cache, CacheStats};
use crate::config::LoreConfig;
use crate::db::{self, HealthReport};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::knowledge::corpus::{Corpus, CorpusHandle};
use crate::knowledge::persist::LogEntry;
use crate::knowledge::staleness::StaleRecord;
use crate::knowledge::store::{IngestOutcome, IngestRequest, KnowledgeStore, RecordPatch};
use crate::knowledge::types::KnowledgeRecord;
use crate::search::analytics::AnalyticsSnapshot;
use crate::search::fusion::{FusionOptions, FusionSearch, FusionWeights, SearchMode, SearchOutcome};
use crate::search::keyword::{IndexStats, KeywordIndex};
use crate::search::vector::{ReindexReport, VectorIndex, VectorStatus};
use crate::search::vector_store::{MemoryVectorStore, VectorStore};

/// Caller-facing search knobs; `None` fields use config defaults.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub mode: SearchMode,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub corpus_size: usize,
    pub indexed_records: usize,
    pub indexed_terms: usize,
    pub vector_count: usize,
    pub vector_status: VectorStatus,
    pub cache_hit_rate: f64,
    pub cache: CacheStats,
    pub by_file: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReindexSummary {
    pub keyword: IndexStats,
    /// `None` when no embedding provider is configured.
    pub vector: Option<ReindexReport>,
}

pub struct KnowledgeEngine {
    store: Mutex<KnowledgeStore>,
    /// Record ids returned by searches, not yet counted.
    pending_usage: StdMutex<Vec<String>>,
    corpus: CorpusHandle,
    keyword: Arc<KeywordIndex>,
    vector: Arc<VectorIndex>,
    fusion: FusionSearch,
    cache: Arc<Cache<Vec<f32>>>,
    sweeper: Option<tokio::task::JoinHandle<()>>,
    default_limit: usize,
}

impl KnowledgeEngine {
    /// Open the configured database and embedding provider with an
    /// in-process vector store. Vectors start empty; call
    /// [`reindex`](Self::reindex) to populate them.
    pub fn open(config: &LoreConfig) -> anyhow::Result<Self> {
        let conn = db::open_database(config.resolved_db_path())?;
        let store = KnowledgeStore::open(conn, config).context("failed to load corpus")?;
        let provider = embedding::create_provider(&config.embedding)?;
        Ok(Self::with_components(
            store,
            provider,
            Arc::new(MemoryVectorStore::new()),
            config,
        ))
    }

    /// Assemble from explicit collaborators. Builds the keyword index
    /// immediately.
    pub fn with_components(
        store: KnowledgeStore,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        vector_store: Arc<dyn VectorStore>,
        config: &LoreConfig,
    ) -> Self {
        let corpus = store.corpus();
        let cache = Arc::new(Cache::from_config(&config.cache));
        let keyword = Arc::new(KeywordIndex::from_config(&config.retrieval));
        let vector = Arc::new(VectorIndex::new(
            provider,
            vector_store,
            Arc::clone(&cache),
            &config.embedding,
        ));
        let fusion = FusionSearch::new(
            Arc::clone(&keyword),
            Arc::clone(&vector),
            corpus.clone(),
            FusionWeights::from_config(&config.retrieval),
        );

        let stats = keyword.index(&corpus.snapshot());
        tracing::info!(entries = stats.entries, terms = stats.terms, "keyword index built");

        let sweeper = (config.cache.sweep_interval_secs > 0
            && tokio::runtime::Handle::try_current().is_ok())
        .then(|| spawn_sweeper(&cache, Duration::from_secs(config.cache.sweep_interval_secs)));

        Self {
            store: Mutex::new(store),
            pending_usage: StdMutex::new(Vec::new()),
            corpus,
            keyword,
            vector,
            fusion,
            cache,
            sweeper,
            default_limit: config.retrieval.default_max_results.max(1),
        }
    }

    /// Hybrid search. Every returned record has its usage counter bumped,
    /// immediately when the store is idle, otherwise once the running
    /// mutation or reindex releases it.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> SearchOutcome {
        let fusion_options = FusionOptions {
            limit: options.limit.unwrap_or(self.default_limit),
            mode: options.mode,
            file_filter: options.file.clone(),
        };
        let outcome = self.fusion.search(query, &fusion_options).await;

        let ids: Vec<String> = outcome.results().iter().map(|r| r.record.id.clone()).collect();
        if !ids.is_empty() {
            lock_pending(&self.pending_usage).extend(ids);
            match self.store.try_lock() {
                Ok(mut store) => flush_usage(&self.pending_usage, &mut store),
                Err(_) => tracing::debug!("store busy, usage bump deferred"),
            }
        }
        outcome
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let mut store = self.store.lock().await;
        let result = store.ingest(request);
        if let Ok(outcome) = &result {
            self.refresh_indexes(&store.snapshot(), &outcome.record).await;
        }
        flush_usage(&self.pending_usage, &mut store);
        result
    }

    pub async fn update(&self, id: &str, patch: RecordPatch) -> Result<KnowledgeRecord> {
        let mut store = self.store.lock().await;
        let result = store.update(id, patch);
        if let Ok(record) = &result {
            self.refresh_indexes(&store.snapshot(), record).await;
        }
        flush_usage(&self.pending_usage, &mut store);
        result
    }

    pub async fn delete(&self, id: &str) -> Result<KnowledgeRecord> {
        let mut store = self.store.lock().await;
        let removed = store.delete(id);
        if removed.is_ok() {
            self.keyword.index(&store.snapshot());
            if self.vector.status() != VectorStatus::Disabled {
                if let Err(e) = self.vector.remove(id).await {
                    tracing::warn!(id, error = %e, "vector removal failed");
                }
            }
        }
        flush_usage(&self.pending_usage, &mut store);
        removed
    }

    async fn refresh_indexes(&self, snapshot: &Corpus, record: &KnowledgeRecord) {
        self.keyword.index(snapshot);
        if self.vector.status() == VectorStatus::Disabled {
            return;
        }
        if let Err(e) = self.vector.index_record(record).await {
            tracing::warn!(id = %record.id, error = %e, "record not added to vector index");
        }
    }

    /// Stale records; `horizon_days` defaults to the configured value.
    pub async fn get_stale_records(&self, horizon_days: Option<u64>) -> Vec<StaleRecord> {
        let mut store = self.store.lock().await;
        flush_usage(&self.pending_usage, &mut store);
        store.stale_records(horizon_days)
    }

    pub async fn get_stats(&self) -> EngineStats {
        let snapshot = self.corpus.snapshot();
        let keyword = self.keyword.stats();
        let vector = self.vector.stats().await;
        let cache = self.cache.stats();

        EngineStats {
            corpus_size: snapshot.len(),
            indexed_records: keyword.entries,
            indexed_terms: keyword.terms,
            vector_count: vector.count,
            vector_status: vector.status,
            cache_hit_rate: cache.hit_rate(),
            cache,
            by_file: snapshot.count_by_file().into_iter().collect(),
        }
    }

    /// Full rebuild of both indexes. `progress` receives the number of
    /// records embedded so far.
    pub async fn reindex(&self, progress: &(dyn Fn(usize) + Sync)) -> Result<ReindexSummary> {
        let mut store = self.store.lock().await;
        flush_usage(&self.pending_usage, &mut store);
        let snapshot = store.snapshot();

        let mut keyword = self.keyword.index(&snapshot);
        if let Err(e) = self.keyword.verify(&snapshot) {
            tracing::warn!(error = %e, "keyword index inconsistent after build, rebuilding");
            keyword = self.keyword.index(&store.snapshot());
        }

        let vector = if self.vector.status() == VectorStatus::Disabled {
            None
        } else {
            let records: Vec<Arc<KnowledgeRecord>> = snapshot.records().cloned().collect();
            let report = self.vector.reindex(&records, progress).await;
            flush_usage(&self.pending_usage, &mut store);
            Some(report?)
        };

        Ok(ReindexSummary { keyword, vector })
    }

    pub fn analytics(&self, limit: usize) -> AnalyticsSnapshot {
        self.keyword.analytics(limit)
    }

    pub fn get(&self, id: &str) -> Option<Arc<KnowledgeRecord>> {
        self.corpus.snapshot().get(id).cloned()
    }

    pub fn snapshot(&self) -> Arc<Corpus> {
        self.corpus.snapshot()
    }

    pub async fn audit_log(&self, id: &str) -> Result<Vec<LogEntry>> {
        self.store.lock().await.audit_log(id)
    }

    pub async fn health(&self) -> anyhow::Result<HealthReport> {
        let store = self.store.lock().await;
        db::check_database_health(store.connection())
    }

    /// Round-trip the embedding provider. `None` when vectors are disabled.
    pub async fn probe_provider(&self) -> Option<Result<usize>> {
        if self.vector.status() == VectorStatus::Disabled {
            return None;
        }
        Some(self.vector.probe().await)
    }

    pub fn vector_status(&self) -> VectorStatus {
        self.vector.status()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.vector.provider_name()
    }

    pub fn cache(&self) -> &Arc<Cache<Vec<f32>>> {
        &self.cache
    }
}

fn lock_pending(pending: &StdMutex<Vec<String>>) -> std::sync::MutexGuard<'_, Vec<String>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Apply queued usage bumps. The caller holds the store lock.
fn flush_usage(pending: &StdMutex<Vec<String>>, store: &mut KnowledgeStore) {
    let ids = std::mem::take(&mut *lock_pending(pending));
    if ids.is_empty() {
        return;
    }
    if let Err(e) = store.record_usage(&ids) {
        tracing::warn!(error = %e, count = ids.len(), "failed to record usage");
    }
}

impl Drop for KnowledgeEngine {
    fn drop(&mut self) {
        flush_usage(&self.pending_usage, self.store.get_mut());
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}
