//! Hot articles, timeline and title search.

mod common;

use metablog::{application::content::ContentService, cache::EngineError};

use common::{article, engine};
use time::macros::datetime;

#[tokio::test]
async fn hot_articles_are_the_most_viewed() {
    let engine = engine();
    engine.seed([
        article(1, "rust", 5, 0),
        article(2, "rust", 50, 1),
        article(3, "go", 20, 2),
        article(4, "go", 1, 3),
    ]);
    engine.content.warm_up().await.expect("warm up");
    assert!(engine.content.record_view(4, "viewer").await);

    let hot = engine.content.hot_articles().await.expect("hot");

    assert_eq!(
        hot.iter().map(|entry| entry.id).collect::<Vec<_>>(),
        vec![2, 3, 1]
    );
    assert_eq!(hot[0].view_count, 50);
    assert_eq!(hot[0].title, "article 2");
}

#[tokio::test]
async fn timeline_groups_by_year_newest_first() {
    let engine = engine();
    let mut older = article(1, "rust", 0, 0);
    older.created_at = datetime!(2023-12-31 23:30:00 UTC);
    engine.seed([older, article(2, "rust", 0, 0), article(3, "go", 0, 90)]);

    let timeline = engine.content.timeline().await.expect("timeline");

    assert_eq!(
        timeline.iter().map(|year| year.year).collect::<Vec<_>>(),
        vec![2024, 2023]
    );
    assert_eq!(
        timeline[0]
            .articles
            .iter()
            .map(|entry| entry.id)
            .collect::<Vec<_>>(),
        vec![3, 2]
    );
    assert_eq!(timeline[0].articles[0].created, "03-01 09:30");
    assert_eq!(timeline[1].articles[0].created, "12-31 23:30");
}

#[tokio::test]
async fn search_is_case_insensitive_with_ranked_views() {
    let engine = engine();
    let mut first = article(1, "rust", 2, 0);
    first.title = "Rust ownership".to_string();
    let mut second = article(2, "rust", 0, 1);
    second.title = "async rust".to_string();
    let mut other = article(3, "go", 0, 2);
    other.title = "Go channels".to_string();
    engine.seed([first, second, other]);
    engine.content.warm_up().await.expect("warm up");
    assert!(engine.content.record_view(1, "viewer").await);

    let found = engine.content.search("RUST", 1).await.expect("search");

    assert_eq!(found.total, 2);
    assert_eq!(
        found.items.iter().map(|item| item.id).collect::<Vec<_>>(),
        vec![2, 1]
    );
    assert_eq!(found.items[1].view_count, 3);
}

#[tokio::test]
async fn search_pages_are_fixed_size() {
    let engine = engine();
    engine.seed((1..=12).map(|id| article(id, "misc", 0, id)));

    let content: &ContentService = &engine.content;
    let first = content.search("article", 1).await.expect("search");
    let second = content.search("article", 2).await.expect("search");

    assert_eq!(first.total, 12);
    assert_eq!(first.items.len(), 9);
    assert_eq!(second.items.len(), 3);
}

#[tokio::test]
async fn blank_search_is_rejected() {
    let engine = engine();

    let err = engine.content.search("  ", 1).await.expect_err("blank");

    assert!(matches!(err, EngineError::InconsistentInput { .. }));
}
