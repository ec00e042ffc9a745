//! Tag rename/merge: persistence first, invalidation only after commit.

mod common;

use metablog::{application::pagination::PageRequest, cache::EngineError};

use common::{article, engine};

fn first_page() -> PageRequest {
    PageRequest::new(1, 10).expect("valid page")
}

#[tokio::test]
async fn failed_commit_leaves_cache_and_rows_untouched() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0), article(2, "rust", 0, 1)]);
    engine.content.article_detail(1).await.expect("detail");
    engine
        .content
        .page_by_tag("rust", first_page())
        .await
        .expect("tag page");
    engine.content.tags().await.expect("tags");
    engine.repos.fail_next_write();

    let err = engine
        .authoring
        .reclassify(&[1, 2], "rust", "systems")
        .await
        .expect_err("commit rejected");

    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(engine.key_exists("article:1:Hash").await);
    assert!(engine.key_exists("rust:article:ZSet").await);
    assert!(engine.key_exists("tag:articleNum:ZSet").await);
    assert_eq!(
        engine.repos.article(1).map(|row| row.tag_name),
        Some("rust".to_string())
    );
    let cached = engine.content.article_detail(1).await.expect("detail");
    assert_eq!(cached.tag_name, "rust");
}

#[tokio::test]
async fn rename_moves_articles_and_invalidates_derived_state() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0), article(2, "rust", 0, 1)]);
    engine.content.warm_up().await.expect("warm up");
    engine.content.article_detail(1).await.expect("detail");
    engine
        .content
        .page_by_tag("rust", first_page())
        .await
        .expect("tag page");
    assert!(engine.content.record_view(2, "viewer").await);

    let report = engine
        .authoring
        .reclassify(&[1, 2, 2], "rust", "systems")
        .await
        .expect("reclassify");

    assert!(report.tag_created);
    assert_eq!(report.tag.name, "systems");
    assert_eq!(report.moved, 2);
    assert!(!engine.key_exists("article:1:Hash").await);
    assert!(!engine.key_exists("rust:article:ZSet").await);

    let moved = engine
        .content
        .page_by_tag("systems", first_page())
        .await
        .expect("new tag page");
    assert_eq!(moved.total, 2);
    let old = engine.content.page_by_tag("rust", first_page()).await;
    assert!(matches!(old, Err(EngineError::NotFound { .. })));

    let detail = engine.content.article_detail(1).await.expect("detail");
    assert_eq!(detail.tag_name, "systems");
    assert_eq!(engine.repos.article(2).map(|row| row.view_count), Some(1));
}

#[tokio::test]
async fn merge_into_existing_tag_reuses_it() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0), article(2, "go", 0, 1)]);
    engine.content.tags().await.expect("tags");

    let report = engine
        .authoring
        .reclassify(&[1], "rust", "go")
        .await
        .expect("merge");

    assert!(!report.tag_created);
    assert_eq!(engine.repos.tag_count(), 2);
    assert!(!engine.key_exists("tag:articleNum:ZSet").await);
    let tags = engine.content.tags().await.expect("tags");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "go");
    assert_eq!(tags[0].article_count, 2);
}

#[tokio::test]
async fn unknown_article_id_is_inconsistent_input() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0)]);

    let err = engine
        .authoring
        .reclassify(&[1, 404], "rust", "systems")
        .await
        .expect_err("unknown id");

    assert!(matches!(err, EngineError::InconsistentInput { .. }));
    assert_eq!(engine.repos.tag_count(), 1);
}

#[tokio::test]
async fn same_or_empty_input_is_rejected() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0)]);

    let same = engine.authoring.reclassify(&[1], "rust", " rust ").await;
    assert!(matches!(same, Err(EngineError::InconsistentInput { .. })));

    let empty = engine.authoring.reclassify(&[], "rust", "go").await;
    assert!(matches!(empty, Err(EngineError::InconsistentInput { .. })));
}
