//! Error taxonomy for the knowledge engine.
//!
//! Near-duplicate merges are not errors: they are reported through
//! [`IngestOutcome::merged`](crate::knowledge::store::IngestOutcome). Provider
//! outages surface as [`KnowledgeError::ProviderUnavailable`] inside the vector
//! layer only; the fusion layer never sees them.

use thiserror::Error;

/// Errors produced by the knowledge store, indexes, and cache.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Malformed ingest or update payload (missing title, empty text, ...).
    #[error("validation failed: {0}")]
    Validation(String),
    /// Unknown record id on update/delete.
    #[error("record not found: {0}")]
    NotFound(String),
    /// Embedding provider or vector store unreachable, failing, or timed out.
    #[error("vector backend unavailable: {0}")]
    ProviderUnavailable(String),
    /// Inconsistency detected while building an index.
    #[error("index corruption: {0}")]
    IndexCorruption(String),
    /// Cache invalidation pattern could not be parsed.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;

impl KnowledgeError {
    /// `true` for errors caused by the caller's input rather than the system.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_classification() {
        assert!(KnowledgeError::Validation("title".into()).is_rejection());
        assert!(KnowledgeError::NotFound("abc".into()).is_rejection());
        assert!(!KnowledgeError::ProviderUnavailable("down".into()).is_rejection());
        assert!(!KnowledgeError::IndexCorruption("dup".into()).is_rejection());
    }

    #[test]
    fn messages_carry_reason() {
        let err = KnowledgeError::NotFound("0192-abc".into());
        assert_eq!(err.to_string(), "record not found: 0192-abc");
    }
}
