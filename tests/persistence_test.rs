mod helpers;

use helpers::{article, test_config};
use lore::db;
use lore::knowledge::{KnowledgeStore, RecordBody, RecordPatch};
use lore::KnowledgeError;
use tempfile::TempDir;

#[test]
fn records_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("knowledge.db");
    let config = test_config();

    let (id, body) = {
        let conn = db::open_database(&db_path).unwrap();
        let mut store = KnowledgeStore::open(conn, &config).unwrap();
        let outcome = store
            .ingest(article("guides", "deploy", "Blue-green deploys", "Switch traffic only after health checks pass.", "docs"))
            .unwrap();
        store
            .update(
                &outcome.record.id,
                RecordPatch {
                    body: Some(RecordBody::article(
                        "Blue-green deploys",
                        "Switch traffic only after every health check passes.",
                    )),
                    verified: Some(true),
                    ..RecordPatch::default()
                },
            )
            .unwrap();
        let current = store.get(&outcome.record.id).unwrap();
        (current.id.clone(), current.body.clone())
    };

    let conn = db::open_database(&db_path).unwrap();
    let store = KnowledgeStore::open(conn, &config).unwrap();
    let record = store.get(&id).expect("record reloaded");
    assert_eq!(record.body, body);
    assert_eq!(record.metadata.version, 2);
    assert!(record.metadata.verified);
    assert_eq!(record.metadata.history.len(), 1);
}

#[test]
fn audit_log_records_each_mutation() {
    let config = test_config();
    let mut store = helpers::test_store(&config);

    let id = store
        .ingest(article("faq", "billing", "Refund window", "Refunds are issued within 30 days.", "docs"))
        .unwrap()
        .record
        .id;
    store
        .ingest(article("faq", "billing", "Refund window", "Refunds are issued within 30 days!", "official-docs"))
        .unwrap();
    store
        .update(
            &id,
            RecordPatch {
                category: Some("payments".into()),
                ..RecordPatch::default()
            },
        )
        .unwrap();
    store.record_usage(&[id.clone()]).unwrap();
    store.delete(&id).unwrap();

    let operations: Vec<String> = store
        .audit_log(&id)
        .unwrap()
        .into_iter()
        .map(|entry| entry.operation)
        .collect();
    assert_eq!(operations, vec!["create", "merge", "update", "usage", "delete"]);
}

#[test]
fn update_and_delete_of_unknown_id_are_not_found() {
    let config = test_config();
    let mut store = helpers::test_store(&config);

    let patch = RecordPatch {
        verified: Some(true),
        ..RecordPatch::default()
    };
    assert!(matches!(store.update("missing", patch), Err(KnowledgeError::NotFound(_))));
    assert!(matches!(store.delete("missing"), Err(KnowledgeError::NotFound(_))));
}

#[test]
fn invalid_ingest_is_rejected_without_writing() {
    let config = test_config();
    let mut store = helpers::test_store(&config);

    let err = store
        .ingest(article("guides", "deploy", "", "Text without a title.", "docs"))
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::Validation(_)));

    let err = store
        .ingest(article("", "deploy", "Title", "Text.", "docs"))
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::Validation(_)));

    assert!(store.snapshot().is_empty());
    let count: i64 = store
        .connection()
        .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn update_back_to_previous_body_keeps_it_out_of_history() {
    let config = test_config();
    let mut store = helpers::test_store(&config);
    let body_a = RecordBody::article("Body A", "Body A text.");
    let body_b = RecordBody::article("Body A", "Body B text.");

    let id = store
        .ingest(article("guides", "deploy", "Body A", "Body A text.", "docs"))
        .unwrap()
        .record
        .id;
    for body in [body_b.clone(), body_a.clone()] {
        store
            .update(
                &id,
                RecordPatch {
                    body: Some(body),
                    ..RecordPatch::default()
                },
            )
            .unwrap();
    }

    let record = store.get(&id).unwrap();
    assert_eq!(record.body, body_a);
    assert_eq!(record.metadata.version, 3);
    assert_eq!(record.metadata.history.len(), 1);
    assert_eq!(record.metadata.history[0].body, body_b);
}
