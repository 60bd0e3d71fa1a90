//! Near-duplicate detection by normalized edit-distance similarity.
//!
//! Candidates are limited to the same `file`/`category` partition. The scan
//! is linear in the partition size.

use std::sync::Arc;

use crate::knowledge::corpus::Corpus;
use crate::knowledge::types::{KnowledgeRecord, RecordBody};
use crate::search::tokenize::normalize_text;

/// Normalized comparison key for a body: canonical title and text.
pub fn comparison_text(body: &RecordBody) -> String {
    let canonical = body.canonical();
    normalize_text(&format!("{} {}", canonical.title, canonical.text))
}

/// Similarity in `[0, 1]` between two already-normalized strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Best match for `body` in its partition with similarity ≥ `threshold`.
///
/// Ties on similarity go to the lowest id so the result is deterministic.
pub fn find_near_duplicate(
    corpus: &Corpus,
    file: &str,
    category: &str,
    body: &RecordBody,
    threshold: f64,
) -> Option<(Arc<KnowledgeRecord>, f64)> {
    let incoming = comparison_text(body);
    let incoming_len = incoming.chars().count();
    let mut best: Option<(Arc<KnowledgeRecord>, f64)> = None;

    for candidate in corpus.partition(file, category) {
        let existing = comparison_text(&candidate.body);

        // Edit distance is at least the length difference, so the ratio of
        // lengths bounds the achievable similarity.
        let existing_len = existing.chars().count();
        let (short, long) = if incoming_len < existing_len {
            (incoming_len, existing_len)
        } else {
            (existing_len, incoming_len)
        };
        if long > 0 && (short as f64 / long as f64) < threshold {
            continue;
        }

        let score = similarity(&incoming, &existing);
        if score < threshold {
            continue;
        }
        // Partition iteration is in id order, so strict `>` keeps the lowest id on ties.
        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((Arc::clone(candidate), score));
        }
    }

    if let Some((record, score)) = &best {
        tracing::debug!(existing = %record.id, similarity = score, "near-duplicate found");
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::RecordMetadata;
    use chrono::Utc;

    fn record(id: &str, category: &str, title: &str, text: &str) -> KnowledgeRecord {
        let now = Utc::now();
        KnowledgeRecord {
            id: id.into(),
            file: "best-practices".into(),
            category: category.into(),
            body: RecordBody::article(title, text),
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
    fn comparison_text_ignores_case_and_spacing() {
        let a = RecordBody::article("Loop  over a list", "Use the\tLoop\nActivity ");
        let b = RecordBody::article("loop over a list", "use the loop activity");
        assert_eq!(comparison_text(&a), "loop over a list use the loop activity");
        assert_eq!(comparison_text(&a), comparison_text(&b));
    }

    #[test]
    fn near_identical_text_is_a_duplicate() {
        let corpus = Corpus::from_records([record(
            "a",
            "loops",
            "Iterate a collection",
            "Use the For Each activity to iterate over every item in a collection.",
        )]);
        let body = RecordBody::article(
            "Iterate a collection",
            "Use the For Each activity to iterate over each item in a collection.",
        );

        let (found, score) = find_near_duplicate(&corpus, "best-practices", "loops", &body, 0.8)
            .expect("should find duplicate");
        assert_eq!(found.id, "a");
        assert!(score >= 0.8 && score < 1.0, "score was {score}");
    }

    #[test]
    fn other_partitions_are_ignored() {
        let corpus = Corpus::from_records([record("a", "errors", "Same title", "Same text body here")]);
        let body = RecordBody::article("Same title", "Same text body here");
        assert!(find_near_duplicate(&corpus, "best-practices", "loops", &body, 0.8).is_none());
    }

    #[test]
    fn unrelated_text_is_not_a_duplicate() {
        let corpus = Corpus::from_records([record(
            "a",
            "loops",
            "Iterate a collection",
            "Use the For Each activity.",
        )]);
        let body = RecordBody::article("Handle timeouts", "Wrap the call in a Retry Scope with a delay.");
        assert!(find_near_duplicate(&corpus, "best-practices", "loops", &body, 0.8).is_none());
    }

    #[test]
    fn best_match_wins_and_ties_prefer_lowest_id() {
        let corpus = Corpus::from_records([
            record("b", "loops", "Title", "identical text"),
            record("a", "loops", "Title", "identical text"),
            record("c", "loops", "Title", "identical texts"),
        ]);
        let body = RecordBody::article("Title", "identical text");
        let (found, score) = find_near_duplicate(&corpus, "best-practices", "loops", &body, 0.8).unwrap();
        assert_eq!(found.id, "a");
        assert_eq!(score, 1.0);
    }
}
