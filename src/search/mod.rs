//! Retrieval: tokenizer, keyword index, vector index, and their fusion.

pub mod analytics;
pub mod fusion;
pub mod keyword;
pub mod tokenize;
pub mod vector;
pub mod vector_store;

pub use fusion::{FusedResult, FusionOptions, FusionSearch, MatchType, SearchMode, SearchOutcome};
pub use keyword::{IndexStats, KeywordHit, KeywordIndex, KeywordSearchOptions};
pub use vector::{ReindexReport, VectorHit, VectorIndex, VectorSearchOptions, VectorStats, VectorStatus};
pub use vector_store::{MemoryVectorStore, VectorMetadata, VectorStore};
