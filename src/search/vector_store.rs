//! Similarity-search store boundary and an in-process implementation.
//!
//! [`MemoryVectorStore`] keeps vectors in a `HashMap` behind
//! `std::sync::RwLock`; queries are brute-force cosine over every vector.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::embedding::cosine_similarity;

/// Payload stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorMetadata {
    pub file: String,
    pub category: String,
    pub title: String,
}

/// One vector to write.
#[derive(Debug, Clone)]
pub struct VectorItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// External similarity-search store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector for `id`.
    async fn upsert(&self, item: VectorItem) -> Result<()>;

    /// Write several vectors. All-or-nothing is not required.
    async fn upsert_batch(&self, items: Vec<VectorItem>) -> Result<()> {
        for item in items {
            self.upsert(item).await?;
        }
        Ok(())
    }

    /// Up to `top_k` `(id, cosine)` pairs, most similar first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>>;

    /// Returns `true` if a vector was removed.
    async fn remove(&self, id: &str) -> Result<bool>;

    async fn count(&self) -> Result<usize>;

    /// Every stored id.
    async fn ids(&self) -> Result<Vec<String>>;

    /// Payload stored with `id`, if any.
    async fn metadata(&self, id: &str) -> Result<Option<VectorMetadata>>;
}

struct StoredVector {
    vector: Vec<f32>,
    metadata: VectorMetadata,
}

/// In-memory store for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryVectorStore {
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, item: VectorItem) -> Result<()> {
        if item.vector.is_empty() {
            bail!("refusing to store an empty vector for {}", item.id);
        }
        let mut vectors = self.vectors.write().unwrap_or_else(|p| p.into_inner());
        if let Some((_, existing)) = vectors
            .iter()
            .find(|(id, v)| **id != item.id && v.vector.len() != item.vector.len())
        {
            bail!(
                "dimension mismatch: store holds {}-d vectors, got {}-d for {}",
                existing.vector.len(),
                item.vector.len(),
                item.id
            );
        }
        vectors.insert(
            item.id,
            StoredVector {
                vector: item.vector,
                metadata: item.metadata,
            },
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>> {
        let vectors = self.vectors.read().unwrap_or_else(|p| p.into_inner());
        let mut scored: Vec<(String, f32)> = vectors
            .iter()
            .map(|(id, stored)| (id.clone(), cosine_similarity(vector, &stored.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut vectors = self.vectors.write().unwrap_or_else(|p| p.into_inner());
        Ok(vectors.remove(id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.vectors.read().unwrap_or_else(|p| p.into_inner()).len())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let vectors = self.vectors.read().unwrap_or_else(|p| p.into_inner());
        let mut ids: Vec<String> = vectors.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn metadata(&self, id: &str) -> Result<Option<VectorMetadata>> {
        let vectors = self.vectors.read().unwrap_or_else(|p| p.into_inner());
        Ok(vectors.get(id).map(|stored| stored.metadata.clone()))
    }
}
