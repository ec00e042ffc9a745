//! Admin write paths and the invalidation they perform.

mod common;

use metablog::{
    application::{content::RankOrder, pagination::PageRequest},
    cache::EngineError,
    domain::{articles::LinkDraft, error::DomainError},
};

use common::{article, draft, engine, link};

fn first_page() -> PageRequest {
    PageRequest::new(1, 10).expect("valid page")
}

#[tokio::test]
async fn created_article_joins_existing_rankings() {
    let engine = engine();
    engine.seed([article(1, "rust", 3, 0)]);
    engine.content.warm_up().await.expect("warm up");
    engine
        .content
        .page_by_tag("rust", first_page())
        .await
        .expect("tag page");

    let created = engine
        .authoring
        .create_article(draft("Fresh post", "rust"))
        .await
        .expect("create");

    assert_eq!(created.view_count, 0);
    let member = created.id.to_string();
    assert_eq!(engine.score("article:view:ZSet", &member).await, Some(0.0));
    assert!(engine.score("article:time:ZSet", &member).await.is_some());
    assert!(!engine.key_exists("rust:article:ZSet").await);

    let newest = engine
        .content
        .page(RankOrder::Time, first_page())
        .await
        .expect("page");
    assert_eq!(newest.items[0].id, created.id);
    let tagged = engine
        .content
        .page_by_tag("rust", first_page())
        .await
        .expect("tag page");
    assert_eq!(tagged.total, 2);
}

#[tokio::test]
async fn created_article_with_absent_sets_is_picked_up_by_rebuild() {
    let engine = engine();

    let created = engine
        .authoring
        .create_article(draft("Only post", "misc"))
        .await
        .expect("create");

    assert!(!engine.key_exists("article:time:ZSet").await);
    let listed = engine
        .content
        .page(RankOrder::View, first_page())
        .await
        .expect("page");
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].id, created.id);
}

#[tokio::test]
async fn duplicate_title_is_inconsistent_input() {
    let engine = engine();
    engine
        .authoring
        .create_article(draft("Same", "misc"))
        .await
        .expect("first");

    let err = engine
        .authoring
        .create_article(draft("Same", "other"))
        .await
        .expect_err("duplicate");

    assert!(matches!(err, EngineError::InconsistentInput { .. }));
}

#[tokio::test]
async fn oversized_content_is_rejected() {
    let engine = engine();
    let mut big = draft("Big", "misc");
    big.content = "x".repeat(64 * 1024 + 1);

    let err = engine
        .authoring
        .create_article(big)
        .await
        .expect_err("too large");

    assert!(matches!(
        err,
        EngineError::Domain(DomainError::ContentTooLarge { .. })
    ));
}

#[tokio::test]
async fn update_keeps_ranked_views_and_moves_tag() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0), article(2, "rust", 0, 1)]);
    engine.content.warm_up().await.expect("warm up");
    engine.content.article_detail(1).await.expect("detail");
    engine
        .content
        .page_by_tag("rust", first_page())
        .await
        .expect("tag page");
    assert!(engine.content.record_view(1, "viewer").await);

    let updated = engine
        .authoring
        .update_article(1, draft("Rewritten", "systems"))
        .await
        .expect("update");

    assert_eq!(updated.tag_name, "systems");
    assert_eq!(updated.view_count, 1);
    assert!(!engine.key_exists("article:1:Hash").await);
    assert!(!engine.key_exists("rust:article:ZSet").await);

    let detail = engine.content.article_detail(1).await.expect("detail");
    assert_eq!(detail.title, "Rewritten");
    assert_eq!(detail.view_count, 1);
    let rust = engine
        .content
        .page_by_tag("rust", first_page())
        .await
        .expect("tag page");
    assert_eq!(rust.total, 1);
}

#[tokio::test]
async fn update_of_missing_article_is_not_found() {
    let engine = engine();

    let err = engine
        .authoring
        .update_article(5, draft("Nothing", "misc"))
        .await
        .expect_err("missing");

    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_removes_article_everywhere() {
    let engine = engine();
    engine.seed([article(1, "rust", 2, 0), article(2, "go", 0, 1)]);
    engine.content.warm_up().await.expect("warm up");
    engine.content.article_detail(1).await.expect("detail");

    let removed = engine.authoring.delete_article(1).await.expect("delete");

    assert_eq!(removed.id, 1);
    assert!(!engine.key_exists("article:1:Hash").await);
    assert_eq!(engine.score("article:view:ZSet", "1").await, None);
    let remaining = engine
        .content
        .page(RankOrder::Time, first_page())
        .await
        .expect("page");
    assert_eq!(remaining.total, 1);
    assert!(engine.content.article_detail(1).await.is_err());
    let gone = engine.content.page_by_tag("rust", first_page()).await;
    assert!(matches!(gone, Err(EngineError::NotFound { .. })));
}

#[tokio::test]
async fn links_follow_their_writes() {
    let engine = engine();
    engine.repos.seed_link(link(1, "old", 0));
    assert_eq!(engine.content.links().await.expect("links").len(), 1);

    let created = engine
        .authoring
        .create_link(LinkDraft {
            name: "new".to_string(),
            url: "https://new.example.com".to_string(),
        })
        .await
        .expect("create link");
    let listed = engine.content.links().await.expect("links");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, created.id);

    let updated = engine
        .authoring
        .update_link(
            1,
            LinkDraft {
                name: "renamed".to_string(),
                url: "https://renamed.example.com".to_string(),
            },
        )
        .await
        .expect("update link");
    assert_eq!(updated.name, "renamed");
    let listed = engine.content.links().await.expect("links");
    assert!(listed.iter().any(|entry| entry.name == "renamed"));

    engine
        .authoring
        .delete_link(created.id)
        .await
        .expect("delete link");
    let listed = engine.content.links().await.expect("links");
    assert_eq!(listed.len(), 1);
    assert!(engine.authoring.delete_link(created.id).await.is_err());
}

#[tokio::test]
async fn duplicate_link_url_is_inconsistent_input() {
    let engine = engine();
    engine.repos.seed_link(link(1, "site", 0));

    let err = engine
        .authoring
        .create_link(LinkDraft {
            name: "other".to_string(),
            url: "https://site.example.com".to_string(),
        })
        .await
        .expect_err("duplicate url");

    assert!(matches!(err, EngineError::InconsistentInput { .. }));
}
