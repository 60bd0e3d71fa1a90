//! Knowledge record lifecycle: types, the shared corpus, quality scoring,
//! near-duplicate detection, staleness, persistence, and the store.

pub mod corpus;
pub mod dedup;
pub mod persist;
pub mod quality;
pub mod staleness;
pub mod store;
pub mod types;

pub use corpus::{Corpus, CorpusHandle};
pub use store::{IngestOutcome, IngestRequest, KnowledgeStore, RecordPatch};
pub use types::{CanonicalText, CodeSample, HistoryEntry, KnowledgeRecord, RecordBody, RecordMetadata};
