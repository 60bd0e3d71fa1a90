use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cache::EvictionStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoreConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub knowledge: KnowledgeConfig,
    pub cache: CacheConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `hashing`, or `none` (keyword-only operation).
    pub provider: String,
    pub model: String,
    pub url: String,
    /// Only used by the hashing provider; HTTP providers report their own.
    pub dimension: usize,
    pub timeout_ms: u64,
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_max_results: usize,
    pub min_score: f64,
    pub coverage_weight: f64,
    pub proximity_weight: f64,
    pub quality_weight: f64,
    pub fuzzy_max_distance: usize,
    pub rrf_k: usize,
    pub keyword_weight: f64,
    pub vector_weight: f64,
    pub candidate_multiplier: usize,
    /// Floor on the rescaled `(cosine + 1) / 2` score. 0.5 is cosine 0.
    pub vector_min_score: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub dedup_threshold: f64,
    pub history_limit: usize,
    pub reliability_weight: f64,
    pub recency_weight: f64,
    pub usage_weight: f64,
    pub verification_weight: f64,
    pub recency_horizon_days: u64,
    pub recency_floor: f64,
    pub usage_saturation: f64,
    pub default_reliability: f64,
    pub source_reliability: HashMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub strategy: EvictionStrategy,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub stale_days: u64,
    /// Domain-version tags that are no longer current; records tagged with
    /// one of them are reported as stale.
    pub superseded_domain_versions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_lore_dir()
            .join("knowledge.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: "nomic-embed-text".into(),
            url: "http://localhost:11434".into(),
            dimension: 256,
            timeout_ms: 3000,
            batch_size: 32,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            min_score: 0.1,
            coverage_weight: 0.5,
            proximity_weight: 0.3,
            quality_weight: 0.2,
            fuzzy_max_distance: 2,
            rrf_k: 60,
            keyword_weight: 0.4,
            vector_weight: 0.6,
            candidate_multiplier: 3,
            vector_min_score: 0.6,
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        let source_reliability = [
            ("official-docs", 1.0),
            ("docs", 0.8),
            ("community", 0.6),
            ("harvester", 0.6),
            ("user", 0.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            dedup_threshold: 0.8,
            history_limit: 10,
            reliability_weight: 0.4,
            recency_weight: 0.2,
            usage_weight: 0.2,
            verification_weight: 0.2,
            recency_horizon_days: 365,
            recency_floor: 0.2,
            usage_saturation: 10.0,
            default_reliability: 0.5,
            source_reliability,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl_secs: 3600,
            strategy: EvictionStrategy::Lru,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            stale_days: 180,
            superseded_domain_versions: Vec::new(),
        }
    }
}

/// Returns `~/.lore/`
pub fn default_lore_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lore")
}

/// Returns the default config file path: `~/.lore/config.toml`
pub fn default_config_path() -> PathBuf {
    default_lore_dir().join("config.toml")
}

impl LoreConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            LoreConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (LORE_DB, LORE_LOG_LEVEL,
    /// LORE_EMBEDDING_URL, LORE_EMBEDDING_PROVIDER).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LORE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("LORE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("LORE_EMBEDDING_URL") {
            self.embedding.url = val;
        }
        if let Ok(val) = std::env::var("LORE_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
