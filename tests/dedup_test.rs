mod helpers;

use helpers::{article, test_config, test_store};
use lore::knowledge::RecordBody;

#[test]
fn dedup_merges_near_duplicate_in_same_partition() {
    let config = test_config();
    let mut store = test_store(&config);

    let first = store
        .ingest(article(
            "troubleshooting",
            "http",
            "Timeouts on large uploads",
            "Raise the client timeout and stream the request body.",
            "community",
        ))
        .unwrap();
    let second = store
        .ingest(article(
            "troubleshooting",
            "http",
            "Timeouts on large uploads",
            "Raise the client timeout and stream the request bodies.",
            "community",
        ))
        .unwrap();

    assert!(second.merged);
    assert_eq!(second.record.id, first.record.id);
    assert!(second.similarity.unwrap() >= config.knowledge.dedup_threshold);
    assert_eq!(store.snapshot().len(), 1);
}

#[test]
fn dedup_does_not_merge_across_categories() {
    let config = test_config();
    let mut store = test_store(&config);

    let text = "Raise the client timeout and stream the request body.";
    let a = store
        .ingest(article("troubleshooting", "http", "Timeouts", text, "docs"))
        .unwrap();
    let b = store
        .ingest(article("troubleshooting", "grpc", "Timeouts", text, "docs"))
        .unwrap();

    assert!(!b.merged);
    assert_ne!(a.record.id, b.record.id);
    assert_eq!(store.snapshot().len(), 2);
}

#[test]
fn dedup_keeps_distinct_records_apart() {
    let config = test_config();
    let mut store = test_store(&config);

    store
        .ingest(article("guides", "auth", "Rotate API keys", "Rotate keys every ninety days from the console.", "docs"))
        .unwrap();
    let other = store
        .ingest(article("guides", "auth", "Revoke sessions", "Sign out every device from the security page.", "docs"))
        .unwrap();

    assert!(!other.merged);
    assert_eq!(store.snapshot().len(), 2);
}

#[test]
fn lower_quality_duplicate_keeps_existing_body_and_records_history() {
    let config = test_config();
    let mut store = test_store(&config);

    let original = store
        .ingest(article(
            "guides",
            "auth",
            "Rotate API keys",
            "Rotate keys every ninety days from the admin console.",
            "official-docs",
        ))
        .unwrap();
    let merged = store
        .ingest(article(
            "guides",
            "auth",
            "Rotate API keys",
            "Rotate keys every ninety days from the admin console!!",
            "user",
        ))
        .unwrap();

    assert!(merged.merged);
    assert_eq!(merged.record.body, original.record.body);
    assert_eq!(merged.record.metadata.source, "official-docs");
    assert_eq!(merged.record.metadata.version, 2);
}

#[test]
fn repeated_ingest_converges_to_one_record() {
    let config = test_config();
    let mut store = test_store(&config);

    let mut ids = Vec::new();
    for _ in 0..5 {
        let outcome = store
            .ingest(article("faq", "billing", "Refund window", "Refunds are issued within 30 days.", "docs"))
            .unwrap();
        ids.push(outcome.record.id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1);
    let record = store.get(&ids[0]).unwrap();
    assert_eq!(record.metadata.version, 5);
    // identical bodies leave no history behind
    assert!(record.metadata.history.is_empty());
    assert_eq!(record.body, RecordBody::article("Refund window", "Refunds are issued within 30 days."));
}

#[test]
fn merge_back_to_earlier_body_clears_it_from_history() {
    let config = test_config();
    let mut store = test_store(&config);
    let body_a = "Raise the client timeout and stream the request body.";
    let body_b = "Raise the client timeout and stream the request bodies.";

    let first = store
        .ingest(article("troubleshooting", "http", "Timeouts on large uploads", body_a, "user"))
        .unwrap();
    let second = store
        .ingest(article("troubleshooting", "http", "Timeouts on large uploads", body_b, "community"))
        .unwrap();
    assert!(second.merged);
    assert_eq!(second.record.body.canonical().text, body_b);

    let third = store
        .ingest(article("troubleshooting", "http", "Timeouts on large uploads", body_a, "official-docs"))
        .unwrap();
    assert!(third.merged);
    assert_eq!(third.record.id, first.record.id);
    assert_eq!(third.record.body.canonical().text, body_a);

    let history = &third.record.metadata.history;
    assert!(history.iter().all(|h| h.body != third.record.body));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body.canonical().text, body_b);
}
