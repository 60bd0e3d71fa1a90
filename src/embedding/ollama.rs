//! Ollama HTTP embedding provider (`POST {url}/api/embed`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

#[derive(Serialize)]
#[serde(untagged)]
enum EmbedRequest<'a> {
    Single { model: &'a str, input: &'a str },
    Batch { model: &'a str, input: &'a [String] },
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    /// Learned from the first response.
    dimension: AtomicUsize,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .context("failed to build HTTP client")?;
        let endpoint = format!("{}/api/embed", config.url.trim_end_matches('/'));
        tracing::info!(endpoint = %endpoint, model = %config.model, "ollama embedding provider configured");

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            dimension: AtomicUsize::new(0),
        })
    }

    async fn request(&self, body: &EmbedRequest<'_>, expected: usize) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .with_context(|| format!("embedding request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("ollama returned {status}: {text}");
        }

        let parsed: EmbedResponse = response.json().await.context("malformed ollama response")?;
        if parsed.embeddings.len() != expected {
            bail!(
                "ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                expected
            );
        }

        let dim = self.dimension.load(Ordering::Relaxed);
        for embedding in &parsed.embeddings {
            if embedding.is_empty() {
                bail!("ollama returned an empty embedding");
            }
            if dim != 0 && embedding.len() != dim {
                bail!("embedding dimension changed from {dim} to {}", embedding.len());
            }
        }
        if dim == 0 {
            if let Some(first) = parsed.embeddings.first() {
                self.dimension.store(first.len(), Ordering::Relaxed);
            }
        }
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbedRequest::Single {
            model: &self.model,
            input: text,
        };
        let mut embeddings = self.request(&body, 1).await?;
        embeddings
            .pop()
            .context("ollama returned no embedding")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest::Batch {
            model: &self.model,
            input: texts,
        };
        self.request(&body, texts.len()).await
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
