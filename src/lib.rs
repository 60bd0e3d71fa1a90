//! Self-learning knowledge base with hybrid keyword + vector retrieval.
//!
//! Lore keeps a corpus of versioned knowledge records (articles, Q&A pairs,
//! and glossary-style entries) in SQLite, scores each record's quality from
//! its source, age, usage and verification state, and folds near-duplicate
//! submissions into existing records instead of storing them twice.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) holds records and an append-only audit log;
//!   the in-memory [`knowledge::Corpus`] is rebuilt from it on open
//! - **Keyword search**: inverted index with coverage, proximity and
//!   quality scoring plus edit-distance fuzzy matching
//! - **Vector search**: pluggable embedding providers (Ollama over HTTP, or
//!   a local feature-hashing fallback) behind a TTL/LRU query cache
//! - **Fusion**: weighted Reciprocal Rank Fusion of both result lists
//!
//! # Modules
//!
//! - [`config`] — TOML configuration with environment overrides
//! - [`db`] — SQLite initialization, schema, migrations, health checks
//! - [`cache`] — bounded TTL cache with LRU/LFU eviction
//! - [`embedding`] — text-to-vector providers
//! - [`knowledge`] — records, quality scoring, dedup, staleness, persistence
//! - [`search`] — keyword index, vector index, fusion, query analytics
//! - [`engine`] — facade tying the store and both indexes together

pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod search;

pub use engine::{KnowledgeEngine, SearchOptions};
pub use error::{KnowledgeError, Result};
