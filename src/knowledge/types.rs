//! Knowledge record type definitions.
//!
//! Defines [`RecordBody`] (the three accepted body shapes), [`CanonicalText`]
//! (the `{title, text}` projection every shape reduces to for indexing),
//! [`RecordMetadata`], [`HistoryEntry`], and [`KnowledgeRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KnowledgeError, Result};

/// A code example attached to a record body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub code: String,
}

/// Structured payload of a knowledge record.
///
/// The search layer only sees the flattened [`CanonicalText`]; the body itself
/// is kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    /// Title plus free text — best practices, guides, notes.
    Article {
        title: String,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        code_samples: Vec<CodeSample>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    /// Question and answer — troubleshooting entries, FAQs.
    Qa {
        question: String,
        answer: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        code_samples: Vec<CodeSample>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    /// Named reference entry — activities, properties, error codes.
    Entry {
        name: String,
        description: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        code_samples: Vec<CodeSample>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
}

/// Canonical `{title, text}` pair derived from any [`RecordBody`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalText {
    pub title: String,
    pub text: String,
}

impl RecordBody {
    /// Shorthand for an article without code samples or tags.
    pub fn article(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Article {
            title: title.into(),
            text: text.into(),
            code_samples: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Article { .. } => "article",
            Self::Qa { .. } => "qa",
            Self::Entry { .. } => "entry",
        }
    }

    pub fn canonical(&self) -> CanonicalText {
        let (title, text) = match self {
            Self::Article { title, text, .. } => (title, text),
            Self::Qa {
                question, answer, ..
            } => (question, answer),
            Self::Entry {
                name, description, ..
            } => (name, description),
        };
        CanonicalText {
            title: title.clone(),
            text: text.clone(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Article { title, .. } => title,
            Self::Qa { question, .. } => question,
            Self::Entry { name, .. } => name,
        }
    }

    pub fn code_samples(&self) -> &[CodeSample] {
        match self {
            Self::Article { code_samples, .. }
            | Self::Qa { code_samples, .. }
            | Self::Entry { code_samples, .. } => code_samples,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            Self::Article { tags, .. } | Self::Qa { tags, .. } | Self::Entry { tags, .. } => tags,
        }
    }

    /// Everything the keyword and vector indexes see, in reading order:
    /// title, text, tags, then code.
    pub fn searchable_text(&self) -> String {
        let canonical = self.canonical();
        let mut parts = vec![canonical.title, canonical.text];
        if !self.tags().is_empty() {
            parts.push(self.tags().join(" "));
        }
        parts.extend(self.code_samples().iter().map(|s| s.code.clone()));
        parts.join("\n")
    }

    /// Reject bodies without a title or text.
    pub fn validate(&self) -> Result<()> {
        let canonical = self.canonical();
        let (title_field, text_field) = match self {
            Self::Article { .. } => ("title", "text"),
            Self::Qa { .. } => ("question", "answer"),
            Self::Entry { .. } => ("name", "description"),
        };
        if canonical.title.trim().is_empty() {
            return Err(KnowledgeError::Validation(format!(
                "{} body is missing `{title_field}`",
                self.kind()
            )));
        }
        if canonical.text.trim().is_empty() {
            return Err(KnowledgeError::Validation(format!(
                "{} body is missing `{text_field}`",
                self.kind()
            )));
        }
        Ok(())
    }

    /// Trim text fields, drop blank tags and empty code samples.
    pub fn normalized(self) -> Self {
        fn clean_tags(tags: Vec<String>) -> Vec<String> {
            let mut out: Vec<String> = Vec::with_capacity(tags.len());
            for tag in tags {
                let tag = tag.trim().to_string();
                if !tag.is_empty() && !out.contains(&tag) {
                    out.push(tag);
                }
            }
            out
        }
        fn clean_samples(samples: Vec<CodeSample>) -> Vec<CodeSample> {
            samples
                .into_iter()
                .filter(|s| !s.code.trim().is_empty())
                .map(|s| CodeSample {
                    language: s.language.map(|l| l.trim().to_lowercase()).filter(|l| !l.is_empty()),
                    code: s.code,
                })
                .collect()
        }

        match self {
            Self::Article {
                title,
                text,
                code_samples,
                tags,
            } => Self::Article {
                title: title.trim().to_string(),
                text: text.trim().to_string(),
                code_samples: clean_samples(code_samples),
                tags: clean_tags(tags),
            },
            Self::Qa {
                question,
                answer,
                code_samples,
                tags,
            } => Self::Qa {
                question: question.trim().to_string(),
                answer: answer.trim().to_string(),
                code_samples: clean_samples(code_samples),
                tags: clean_tags(tags),
            },
            Self::Entry {
                name,
                description,
                code_samples,
                tags,
            } => Self::Entry {
                name: name.trim().to_string(),
                description: description.trim().to_string(),
                code_samples: clean_samples(code_samples),
                tags: clean_tags(tags),
            },
        }
    }
}

/// A prior version of a record body, kept for audit and rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub body: RecordBody,
    pub quality_score: f64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Provenance, lifecycle, and quality data for a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Free-text provenance, e.g. `docs` or `harvester:docs.example.com@2026-03-01T00:00:00Z`.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of searches that returned this record.
    pub usage_count: u64,
    pub verified: bool,
    /// Always in `[0.0, 1.0]`; written only by the quality scorer.
    pub quality_score: f64,
    /// Starts at 1 and only increases.
    pub version: u32,
    /// Domain/platform release the record was written against, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_version: Option<String>,
    /// Prior bodies, oldest first. Never contains the current body.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// The unit of stored knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    /// UUID v7, assigned on first ingest.
    pub id: String,
    pub file: String,
    pub category: String,
    pub body: RecordBody,
    pub metadata: RecordMetadata,
}

impl KnowledgeRecord {
    pub fn canonical(&self) -> CanonicalText {
        self.body.canonical()
    }

    pub fn quality_score(&self) -> f64 {
        self.metadata.quality_score
    }

    /// Append a prior version to history, dropping the oldest entries beyond
    /// `limit`. Call after the body is set: history never holds the current
    /// body, so older entries equal to it are removed too.
    pub fn push_history(&mut self, entry: HistoryEntry, limit: usize) {
        if entry.body != self.body {
            self.metadata.history.push(entry);
        }
        let current = &self.body;
        self.metadata.history.retain(|h| h.body != *current);
        if self.metadata.history.len() > limit {
            let excess = self.metadata.history.len() - limit;
            self.metadata.history.drain(..excess);
        }
    }

    /// Snapshot of the current body for [`push_history`](Self::push_history).
    pub fn snapshot(&self) -> HistoryEntry {
        HistoryEntry {
            body: self.body.clone(),
            quality_score: self.metadata.quality_score,
            source: self.metadata.source.clone(),
            timestamp: self.metadata.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(body: RecordBody) -> KnowledgeRecord {
        let now = Utc::now();
        KnowledgeRecord {
            id: "r1".into(),
            file: "best-practices".into(),
            category: "loops".into(),
            body,
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
        }
    }

    #[test]
    fn canonical_projection_per_shape() {
        let qa = RecordBody::Qa {
            question: "Why does the build fail?".into(),
            answer: "Missing dependency.".into(),
            code_samples: vec![],
            tags: vec![],
        };
        assert_eq!(qa.canonical().title, "Why does the build fail?");
        assert_eq!(qa.canonical().text, "Missing dependency.");

        let entry = RecordBody::Entry {
            name: "Assign".into(),
            description: "Sets a variable.".into(),
            code_samples: vec![],
            tags: vec![],
        };
        assert_eq!(entry.title(), "Assign");
        assert_eq!(entry.kind(), "entry");
    }

    #[test]
    fn body_json_is_tagged() {
        let body = RecordBody::article("Loop over a list", "Use the Loop activity.");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "article");
        assert_eq!(json["title"], "Loop over a list");
        assert!(json.get("tags").is_none());

        let parsed: RecordBody = serde_json::from_value(serde_json::json!({
            "kind": "qa",
            "question": "q?",
            "answer": "a.",
            "tags": ["x"]
        }))
        .unwrap();
        assert_eq!(parsed.tags(), ["x".to_string()]);
    }

    #[test]
    fn validate_rejects_missing_title_or_text() {
        assert!(RecordBody::article("", "text").validate().is_err());
        assert!(RecordBody::article("title", "   ").validate().is_err());
        assert!(RecordBody::article("title", "text").validate().is_ok());

        let err = RecordBody::Qa {
            question: "q".into(),
            answer: "".into(),
            code_samples: vec![],
            tags: vec![],
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("answer"));
    }

    #[test]
    fn normalized_trims_and_dedupes_tags() {
        let body = RecordBody::Article {
            title: "  Title ".into(),
            text: "Text\n".into(),
            code_samples: vec![
                CodeSample { language: Some(" VB ".into()), code: "x = 1".into() },
                CodeSample { language: None, code: "   ".into() },
            ],
            tags: vec!["loop".into(), " loop ".into(), "".into()],
        }
        .normalized();

        assert_eq!(body.title(), "Title");
        assert_eq!(body.tags(), ["loop".to_string()]);
        assert_eq!(body.code_samples().len(), 1);
        assert_eq!(body.code_samples()[0].language.as_deref(), Some("vb"));
    }

    #[test]
    fn searchable_text_includes_tags_and_code() {
        let body = RecordBody::Article {
            title: "T".into(),
            text: "body".into(),
            code_samples: vec![CodeSample { language: None, code: "ForEach item".into() }],
            tags: vec!["iteration".into()],
        };
        let text = body.searchable_text();
        assert!(text.contains("iteration"));
        assert!(text.contains("ForEach item"));
    }

    #[test]
    fn history_skips_current_body_and_caps_length() {
        let mut rec = record(RecordBody::article("A", "one"));
        let same = rec.snapshot();
        rec.push_history(same, 2);
        assert!(rec.metadata.history.is_empty());

        for i in 0..3 {
            let mut entry = rec.snapshot();
            entry.body = RecordBody::article("A", format!("old {i}"));
            rec.push_history(entry, 2);
        }
        assert_eq!(rec.metadata.history.len(), 2);
        assert_eq!(rec.metadata.history[0].body.canonical().text, "old 1");
    }

    #[test]
    fn history_drops_entries_matching_restored_body() {
        let mut rec = record(RecordBody::article("A", "first"));
        let first = rec.snapshot();
        rec.body = RecordBody::article("A", "second");
        rec.push_history(first, 10);

        let second = rec.snapshot();
        rec.body = RecordBody::article("A", "first");
        rec.push_history(second, 10);

        assert_eq!(rec.metadata.history.len(), 1);
        assert_eq!(rec.metadata.history[0].body.canonical().text, "second");
        assert!(rec.metadata.history.iter().all(|h| h.body != rec.body));
    }
}
