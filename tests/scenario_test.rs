mod helpers;

use helpers::{article, engine_with_provider, test_config, test_engine, SwitchableProvider};
use lore::embedding::EmbeddingProvider;
use lore::search::{MatchType, SearchMode, SearchOutcome, VectorStatus};
use lore::SearchOptions;
use std::sync::Arc;

const LOOP_TITLE: &str = "Loop over a list";
const LOOP_TEXT: &str = "Use the Loop activity with an IterableList source.";

#[tokio::test]
async fn ingest_then_search_finds_record_by_keyword() {
    let engine = test_engine();

    let outcome = engine
        .ingest(article("best-practices", "loops", LOOP_TITLE, LOOP_TEXT, "docs"))
        .await
        .unwrap();
    assert!(!outcome.merged);
    assert_eq!(outcome.record.metadata.version, 1);

    let results = engine.search("iterate over a list", &SearchOptions::default()).await;
    let hit = results
        .results()
        .iter()
        .find(|r| r.record.id == outcome.record.id)
        .expect("ingested record should be found");
    assert!(
        matches!(hit.match_type, MatchType::Keyword | MatchType::Both),
        "expected a keyword contribution, got {:?}",
        hit.match_type
    );
    assert!(hit.keyword_score.is_some());
}

#[tokio::test]
async fn near_duplicate_from_better_source_merges() {
    let engine = test_engine();

    let first = engine
        .ingest(article("best-practices", "loops", LOOP_TITLE, LOOP_TEXT, "docs"))
        .await
        .unwrap();

    let second = engine
        .ingest(article(
            "best-practices",
            "loops",
            LOOP_TITLE,
            "Use the Loop activity with an IterableList source!",
            "official-docs",
        ))
        .await
        .unwrap();

    assert!(second.merged);
    assert_eq!(second.record.id, first.record.id);
    assert_eq!(second.record.metadata.version, 2);
    assert!(second.quality_score >= first.quality_score);
    assert_eq!(second.record.metadata.source, "official-docs");
    assert_eq!(engine.snapshot().len(), 1);
}

#[tokio::test]
async fn provider_outage_falls_back_to_keyword_results() {
    let config = test_config();
    let provider = Arc::new(SwitchableProvider::new(config.embedding.dimension));
    let engine = engine_with_provider(&config, Some(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>));

    engine
        .ingest(article("best-practices", "loops", LOOP_TITLE, LOOP_TEXT, "docs"))
        .await
        .unwrap();

    provider.set_down(true);
    let options = SearchOptions {
        mode: SearchMode::Hybrid,
        ..SearchOptions::default()
    };
    let outcome = engine.search("loop activity", &options).await;

    assert!(!outcome.is_empty());
    assert!(outcome
        .results()
        .iter()
        .all(|r| r.match_type == MatchType::Keyword && r.vector_score.is_none()));
    assert_eq!(engine.vector_status(), VectorStatus::Unavailable);

    // Recovery restores hybrid matches without a restart.
    provider.set_down(false);
    let outcome = engine.search("loop activity", &options).await;
    assert_eq!(outcome.results()[0].match_type, MatchType::Both);
    assert_eq!(engine.vector_status(), VectorStatus::Ready);
}

#[tokio::test]
async fn single_typo_still_matches_through_fuzzy_fallback() {
    let engine = test_engine();
    let record = engine
        .ingest(article("best-practices", "loops", LOOP_TITLE, LOOP_TEXT, "docs"))
        .await
        .unwrap()
        .record;
    engine
        .ingest(article(
            "best-practices",
            "errors",
            "Catch exceptions",
            "Wrap risky calls in a Try Catch block.",
            "docs",
        ))
        .await
        .unwrap();

    let options = SearchOptions {
        mode: SearchMode::KeywordOnly,
        ..SearchOptions::default()
    };
    let outcome = engine.search("activty", &options).await;

    let top = &outcome.results()[0];
    assert_eq!(top.record.id, record.id);
    let min_score = test_config().retrieval.min_score;
    assert!(top.keyword_score.unwrap() >= min_score);
}

#[tokio::test]
async fn search_bumps_usage_of_returned_records() {
    let engine = test_engine();
    let record = engine
        .ingest(article("best-practices", "loops", LOOP_TITLE, LOOP_TEXT, "docs"))
        .await
        .unwrap()
        .record;

    engine.search("loop", &SearchOptions::default()).await;
    engine.search("loop", &SearchOptions::default()).await;

    let current = engine.get(&record.id).unwrap();
    assert_eq!(current.metadata.usage_count, 2);
}

#[tokio::test]
async fn unmatched_query_returns_no_results_and_is_tracked_as_gap() {
    let engine = test_engine();
    engine
        .ingest(article("best-practices", "loops", LOOP_TITLE, LOOP_TEXT, "docs"))
        .await
        .unwrap();

    let options = SearchOptions {
        mode: SearchMode::Hybrid,
        ..SearchOptions::default()
    };
    let outcome = engine.search("kubernetes", &options).await;
    assert!(outcome.is_empty(), "unexpected matches: {:?}", outcome.results());
    assert!(matches!(outcome, SearchOutcome::NoResults { ref query } if query == "kubernetes"));

    let analytics = engine.analytics(10);
    assert_eq!(analytics.total_queries, 1);
    assert_eq!(analytics.gaps[0].query, "kubernetes");
}

#[tokio::test]
async fn unmatched_query_leaves_usage_untouched() {
    let engine = test_engine();
    let record = engine
        .ingest(article("best-practices", "loops", LOOP_TITLE, LOOP_TEXT, "docs"))
        .await
        .unwrap()
        .record;

    for mode in [SearchMode::Hybrid, SearchMode::VectorOnly] {
        let options = SearchOptions {
            mode,
            ..SearchOptions::default()
        };
        assert!(engine.search("kubernetes", &options).await.is_empty(), "{mode:?} matched");
    }
    assert_eq!(engine.get(&record.id).unwrap().metadata.usage_count, 0);
}
