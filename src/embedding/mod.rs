//! Text-to-vector embedding providers.
//!
//! Provides the [`EmbeddingProvider`] trait plus two implementations: an
//! Ollama HTTP client ([`ollama::OllamaEmbeddingProvider`]) and a deterministic
//! feature-hashing embedder ([`hashing::HashingEmbeddingProvider`]) for offline
//! use and tests. The provider is created via [`create_provider`] from
//! configuration.

pub mod hashing;
pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding text into vectors.
///
/// Implementations must return vectors of a single, fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch, one vector per input in input order. Implementations
    /// may override for batched inference.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Number of dimensions this provider produces, or 0 if not yet known.
    fn dimension(&self) -> usize;

    /// Short identifier for logs and stats.
    fn name(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// `"none"` returns `Ok(None)`: the engine then runs keyword-only.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "ollama" => {
            let provider = ollama::OllamaEmbeddingProvider::new(config)?;
            Ok(Some(Arc::new(provider)))
        }
        "hashing" => Ok(Some(Arc::new(hashing::HashingEmbeddingProvider::new(
            config.dimension,
        )))),
        "none" => Ok(None),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: ollama, hashing, none"),
    }
}

/// Cosine similarity. Zero-length or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}
