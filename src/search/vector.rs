//! Semantic retrieval over an [`EmbeddingProvider`] and a [`VectorStore`].
//!
//! Query embeddings are cached under `embed:<normalized text>`. Every provider
//! and store call runs under a timeout. Failures flip the status to
//! [`VectorStatus::Unavailable`] and make [`VectorIndex::search`] return no
//! hits; the next successful call flips it back to `Ready`.

use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::Cache;
use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{KnowledgeError, Result};
use crate::knowledge::types::KnowledgeRecord;
use crate::search::tokenize::normalize_text;
use crate::search::vector_store::{VectorItem, VectorMetadata, VectorStore};

/// Cache key prefix for query embeddings.
pub const EMBED_KEY_PREFIX: &str = "embed:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStatus {
    Ready,
    Unavailable,
    /// No provider configured.
    Disabled,
}

impl std::fmt::Display for VectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorSearchOptions {
    pub top_k: usize,
    /// Applied to the rescaled `[0, 1]` score.
    pub min_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub record_id: String,
    /// `(cosine + 1) / 2`
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStats {
    pub count: usize,
    pub dimension: usize,
    pub status: VectorStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexReport {
    pub indexed: usize,
    /// `(record id, reason)` for every record that could not be indexed.
    pub failed: Vec<(String, String)>,
    /// Vectors dropped because their record no longer exists.
    pub removed: usize,
}

pub struct VectorIndex {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Arc<dyn VectorStore>,
    cache: Arc<Cache<Vec<f32>>>,
    timeout: Duration,
    batch_size: usize,
    status: Mutex<VectorStatus>,
}

fn record_metadata(record: &KnowledgeRecord) -> VectorMetadata {
    VectorMetadata {
        file: record.file.clone(),
        category: record.category.clone(),
        title: record.body.title().to_string(),
    }
}

/// Map cosine `[-1, 1]` onto `[0, 1]`.
pub fn rescale_cosine(cosine: f32) -> f64 {
    ((f64::from(cosine) + 1.0) / 2.0).clamp(0.0, 1.0)
}

impl VectorIndex {
    pub fn new(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        store: Arc<dyn VectorStore>,
        cache: Arc<Cache<Vec<f32>>>,
        config: &EmbeddingConfig,
    ) -> Self {
        let status = if provider.is_some() {
            VectorStatus::Ready
        } else {
            VectorStatus::Disabled
        };
        Self {
            provider,
            store,
            cache,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            batch_size: config.batch_size.max(1),
            status: Mutex::new(status),
        }
    }

    pub fn status(&self) -> VectorStatus {
        *self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_status(&self, next: VectorStatus) {
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        if *status == VectorStatus::Disabled || *status == next {
            return;
        }
        match next {
            VectorStatus::Unavailable => tracing::warn!("vector backend unavailable"),
            VectorStatus::Ready => tracing::info!("vector backend recovered"),
            VectorStatus::Disabled => {}
        }
        *status = next;
    }

    fn provider(&self) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .as_ref()
            .ok_or_else(|| KnowledgeError::ProviderUnavailable("no embedding provider configured".into()))
    }

    /// Run a backend call under the timeout, tracking availability.
    async fn guarded<T>(&self, what: &str, fut: impl Future<Output = anyhow::Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => {
                self.set_status(VectorStatus::Ready);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.set_status(VectorStatus::Unavailable);
                Err(KnowledgeError::ProviderUnavailable(format!("{what}: {e:#}")))
            }
            Err(_) => {
                self.set_status(VectorStatus::Unavailable);
                Err(KnowledgeError::ProviderUnavailable(format!(
                    "{what}: timed out after {} ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// Embed query text, using the cache.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = format!("{EMBED_KEY_PREFIX}{}", normalize_text(text));
        if let Some(vector) = self.cache.get(&key) {
            return Ok(vector);
        }
        let provider = self.provider()?;
        let vector = self.guarded("embed", provider.embed(text)).await?;
        self.cache.set(key, vector.clone(), None);
        Ok(vector)
    }

    pub async fn upsert(&self, record_id: &str, vector: Vec<f32>, metadata: VectorMetadata) -> Result<()> {
        self.provider()?;
        let item = VectorItem {
            id: record_id.to_string(),
            vector,
            metadata,
        };
        self.guarded("upsert", self.store.upsert(item)).await
    }

    /// Nearest records to `text`. Backend failures yield no hits.
    pub async fn search(&self, text: &str, options: &VectorSearchOptions) -> Vec<VectorHit> {
        if self.provider.is_none() || options.top_k == 0 || text.trim().is_empty() {
            return Vec::new();
        }
        match self.try_search(text, options).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "vector search degraded to no results");
                Vec::new()
            }
        }
    }

    async fn try_search(&self, text: &str, options: &VectorSearchOptions) -> Result<Vec<VectorHit>> {
        let vector = self.embed(text).await?;
        let raw = self.guarded("query", self.store.query(&vector, options.top_k)).await?;
        Ok(raw
            .into_iter()
            .map(|(record_id, cosine)| VectorHit {
                record_id,
                score: rescale_cosine(cosine),
            })
            .filter(|hit| hit.score >= options.min_score)
            .collect())
    }

    /// Embed and store one record. Record texts bypass the query cache.
    pub async fn index_record(&self, record: &KnowledgeRecord) -> Result<()> {
        let provider = self.provider()?;
        let vector = self
            .guarded("embed", provider.embed(&record.body.searchable_text()))
            .await?;
        self.upsert(&record.id, vector, record_metadata(record)).await
    }

    /// Embed a fixed string without touching the cache; returns the vector
    /// dimension.
    pub async fn probe(&self) -> Result<usize> {
        let provider = self.provider()?;
        let vector = self.guarded("probe", provider.embed("lore health probe")).await?;
        Ok(vector.len())
    }

    pub async fn remove(&self, record_id: &str) -> Result<bool> {
        self.provider()?;
        self.guarded("remove", self.store.remove(record_id)).await
    }

    /// Re-embed every record in batches and drop vectors for records that no
    /// longer exist. A failed batch is retried record by record so only the
    /// failing records are lost. `progress` receives the number of records
    /// processed so far.
    pub async fn reindex(
        &self,
        records: &[Arc<KnowledgeRecord>],
        progress: &(dyn Fn(usize) + Sync),
    ) -> Result<ReindexReport> {
        let provider = self.provider()?;
        let mut report = ReindexReport::default();
        let mut processed = 0;
        let mut backend_down = false;

        for chunk in records.chunks(self.batch_size) {
            if backend_down {
                report.failed.extend(
                    chunk
                        .iter()
                        .map(|r| (r.id.clone(), "skipped: vector backend unavailable".to_string())),
                );
                processed += chunk.len();
                progress(processed);
                continue;
            }

            match self.index_batch(provider, chunk).await {
                Ok(()) => report.indexed += chunk.len(),
                Err(e) => {
                    tracing::warn!(error = %e, batch = chunk.len(), "batch failed, retrying per record");
                    let mut chunk_failures = 0;
                    for record in chunk {
                        match self.index_record(record).await {
                            Ok(()) => report.indexed += 1,
                            Err(e) => {
                                tracing::warn!(id = %record.id, error = %e, "record not indexed");
                                report.failed.push((record.id.clone(), e.to_string()));
                                chunk_failures += 1;
                            }
                        }
                    }
                    backend_down = chunk_failures == chunk.len() && self.status() == VectorStatus::Unavailable;
                }
            }
            processed += chunk.len();
            progress(processed);
        }

        if !backend_down {
            report.removed = self.remove_orphans(records).await?;
        }

        let invalidated = self.cache.invalidate_pattern(&format!("{EMBED_KEY_PREFIX}*"))?;
        tracing::info!(
            indexed = report.indexed,
            failed = report.failed.len(),
            removed = report.removed,
            invalidated,
            "vector reindex complete"
        );
        Ok(report)
    }

    async fn index_batch(&self, provider: &Arc<dyn EmbeddingProvider>, chunk: &[Arc<KnowledgeRecord>]) -> Result<()> {
        let texts: Vec<String> = chunk.iter().map(|r| r.body.searchable_text()).collect();
        let vectors = self.guarded("embed_batch", provider.embed_batch(&texts)).await?;
        if vectors.len() != chunk.len() {
            return Err(KnowledgeError::ProviderUnavailable(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                chunk.len()
            )));
        }
        let items = chunk
            .iter()
            .zip(vectors)
            .map(|(record, vector)| VectorItem {
                id: record.id.clone(),
                vector,
                metadata: record_metadata(record),
            })
            .collect();
        self.guarded("upsert_batch", self.store.upsert_batch(items)).await
    }

    async fn remove_orphans(&self, records: &[Arc<KnowledgeRecord>]) -> Result<usize> {
        let live: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let stored = self.guarded("ids", self.store.ids()).await?;
        let mut removed = 0;
        for id in stored.iter().filter(|id| !live.contains(id.as_str())) {
            if self.guarded("remove", self.store.remove(id)).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Current vector count; 0 when the store cannot be reached.
    pub async fn stats(&self) -> VectorStats {
        let count = if self.provider.is_some() {
            self.guarded("count", self.store.count()).await.unwrap_or(0)
        } else {
            0
        };
        VectorStats {
            count,
            dimension: self.provider.as_ref().map(|p| p.dimension()).unwrap_or(0),
            status: self.status(),
        }
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionStrategy;
    use crate::embedding::hashing::HashingEmbeddingProvider;
    use crate::knowledge::types::{RecordBody, RecordMetadata};
    use crate::search::vector_store::MemoryVectorStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts calls and fails on demand, or on texts containing "poison".
    struct FlakyProvider {
        inner: HashingEmbeddingProvider,
        calls: AtomicUsize,
        down: AtomicBool,
    }

    impl FlakyProvider {
        fn new() -> Self {
            Self {
                inner: HashingEmbeddingProvider::new(64),
                calls: AtomicUsize::new(0),
                down: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            if text.contains("poison") {
                anyhow::bail!("cannot embed poison");
            }
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) || self.down.load(Ordering::SeqCst) {
                anyhow::bail!("batch rejected");
            }
            self.inner.embed_batch(texts).await
        }

        fn dimension(&self) -> usize {
            64
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0])
        }
        fn dimension(&self) -> usize {
            1
        }
        fn name(&self) -> &str {
            "slow"
        }
    }

    fn record(id: &str, title: &str, text: &str) -> Arc<KnowledgeRecord> {
        let now = Utc::now();
        Arc::new(KnowledgeRecord {
            id: id.into(),
            file: "f".into(),
            category: "c".into(),
            body: RecordBody::article(title, text),
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

    fn cache() -> Arc<Cache<Vec<f32>>> {
        Arc::new(Cache::new(100, None, EvictionStrategy::Lru))
    }

    fn index_with(provider: Option<Arc<dyn EmbeddingProvider>>, cache: Arc<Cache<Vec<f32>>>) -> VectorIndex {
        let config = EmbeddingConfig {
            timeout_ms: 200,
            batch_size: 2,
            ..Default::default()
        };
        VectorIndex::new(provider, Arc::new(MemoryVectorStore::new()), cache, &config)
    }

    #[tokio::test]
    async fn test_query_embeddings_are_cached() {
        let provider = Arc::new(FlakyProvider::new());
        let cache = cache();
        let index = index_with(Some(provider.clone()), cache.clone());

        index.embed("Retry  Scope").await.unwrap();
        index.embed("retry scope").await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1, "second call must hit the cache");
        assert!(cache.has("embed:retry scope"));
    }

    #[tokio::test]
    async fn test_search_finds_indexed_record() {
        let index = index_with(Some(Arc::new(HashingEmbeddingProvider::new(128))), cache());
        index.index_record(&record("a", "Retry scope", "Retry flaky activities")).await.unwrap();
        index.index_record(&record("b", "Invoices", "Export invoice totals")).await.unwrap();

        let hits = index
            .search("retry flaky", &VectorSearchOptions { top_k: 5, min_score: 0.0 })
            .await;
        assert_eq!(hits[0].record_id, "a");
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }

    #[tokio::test]
    async fn test_outage_degrades_and_recovers() {
        let provider = Arc::new(FlakyProvider::new());
        let index = index_with(Some(provider.clone()), cache());
        index.index_record(&record("a", "Retry scope", "Retry flaky activities")).await.unwrap();

        provider.down.store(true, Ordering::SeqCst);
        let hits = index
            .search("selectors", &VectorSearchOptions { top_k: 5, min_score: 0.0 })
            .await;
        assert!(hits.is_empty());
        assert_eq!(index.status(), VectorStatus::Unavailable);

        provider.down.store(false, Ordering::SeqCst);
        let hits = index
            .search("selectors", &VectorSearchOptions { top_k: 5, min_score: 0.0 })
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(index.status(), VectorStatus::Ready);
    }

    #[tokio::test]
    async fn test_timeout_is_provider_unavailable() {
        let index = index_with(Some(Arc::new(SlowProvider)), cache());
        let err = index.embed("anything").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::ProviderUnavailable(ref m) if m.contains("timed out")));
        assert_eq!(index.status(), VectorStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_disabled_index_returns_nothing() {
        let index = index_with(None, cache());
        assert_eq!(index.status(), VectorStatus::Disabled);
        assert!(index
            .search("anything", &VectorSearchOptions { top_k: 5, min_score: 0.0 })
            .await
            .is_empty());
        assert!(index.index_record(&record("a", "t", "x")).await.is_err());
        assert_eq!(index.status(), VectorStatus::Disabled);
    }

    #[tokio::test]
    async fn test_reindex_reports_partial_failure() {
        let index = index_with(Some(Arc::new(FlakyProvider::new())), cache());
        let records = vec![
            record("a", "Good one", "fine text"),
            record("b", "Bad one", "poison text"),
            record("c", "Good two", "more fine text"),
        ];

        let seen = AtomicUsize::new(0);
        let report = index
            .reindex(&records, &|n| {
                seen.store(n, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(index.stats().await.count, 2);
    }

    #[tokio::test]
    async fn test_reindex_removes_orphans_and_invalidates_cache() {
        let cache = cache();
        let index = index_with(Some(Arc::new(HashingEmbeddingProvider::new(32))), cache.clone());
        index.index_record(&record("gone", "Old", "deleted record")).await.unwrap();
        index.embed("some query").await.unwrap();
        cache.set("other:key", vec![1.0], None);

        let report = index.reindex(&[record("a", "Kept", "live record")], &|_: usize| {}).await.unwrap();

        assert_eq!(report.indexed, 1);
        assert_eq!(report.removed, 1);
        assert!(!cache.has("embed:some query"));
        assert!(cache.has("other:key"));
    }

    #[test]
    fn test_rescale_cosine() {
        assert_eq!(rescale_cosine(1.0), 1.0);
        assert_eq!(rescale_cosine(-1.0), 0.0);
        assert_eq!(rescale_cosine(0.0), 0.5);
    }
}
