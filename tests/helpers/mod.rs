#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lore::config::LoreConfig;
use lore::db;
use lore::embedding::hashing::HashingEmbeddingProvider;
use lore::embedding::EmbeddingProvider;
use lore::knowledge::{IngestRequest, KnowledgeStore, RecordBody};
use lore::search::MemoryVectorStore;
use lore::KnowledgeEngine;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Defaults with the background sweeper off and a short provider timeout.
pub fn test_config() -> LoreConfig {
    let mut config = LoreConfig::default();
    config.cache.sweep_interval_secs = 0;
    config.embedding.provider = "hashing".into();
    config.embedding.dimension = 128;
    config.embedding.timeout_ms = 500;
    config
}

/// Store over a fresh in-memory database.
pub fn test_store(config: &LoreConfig) -> KnowledgeStore {
    let conn = db::open_memory_database().unwrap();
    KnowledgeStore::open(conn, config).unwrap()
}

/// Engine with the hashing embedder and an in-memory vector store.
pub fn test_engine() -> KnowledgeEngine {
    let config = test_config();
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(HashingEmbeddingProvider::new(config.embedding.dimension));
    engine_with_provider(&config, Some(provider))
}

pub fn engine_with_provider(
    config: &LoreConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
) -> KnowledgeEngine {
    KnowledgeEngine::with_components(
        test_store(config),
        provider,
        Arc::new(MemoryVectorStore::new()),
        config,
    )
}

pub fn article(file: &str, category: &str, title: &str, text: &str, source: &str) -> IngestRequest {
    IngestRequest {
        file: file.into(),
        category: category.into(),
        body: RecordBody::article(title, text),
        source: source.into(),
        verified: false,
        domain_version: None,
    }
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Embedder that fails while `down` is set; otherwise hashes like the
/// default provider.
pub struct SwitchableProvider {
    inner: HashingEmbeddingProvider,
    down: AtomicBool,
}

impl SwitchableProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbeddingProvider::new(dimension),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for SwitchableProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if self.down.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(self.inner.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "switchable"
    }
}

/// Hashing embedder that sleeps `delay` before every call once set.
pub struct SlowProvider {
    inner: HashingEmbeddingProvider,
    delay_ms: AtomicU64,
}

impl SlowProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbeddingProvider::new(dimension),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_delay(&self, delay: std::time::Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        Ok(self.inner.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "slow"
    }
}
