//! Deduplicated view counting under concurrency and cooldown expiry.

mod common;

use std::{sync::Arc, time::Duration};

use futures::future::join_all;

use common::{article, engine};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_views_from_one_viewer_count_once() {
    let engine = Arc::new(engine());
    engine.seed([article(1, "rust", 10, 0)]);
    engine.content.warm_up().await.expect("warm up");
    engine.content.article_detail(1).await.expect("detail");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.content.record_view(1, "10.0.0.1").await })
        })
        .collect();
    let mut counted = 0;
    for handle in handles {
        if handle.await.expect("task") {
            counted += 1;
        }
    }

    assert_eq!(counted, 1);
    assert_eq!(engine.score("article:view:ZSet", "1").await, Some(11.0));
    let detail = engine.content.article_detail(1).await.expect("detail");
    assert_eq!(detail.view_count, 11);
}

#[tokio::test(start_paused = true)]
async fn viewer_counts_again_after_cooldown() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0)]);

    assert!(engine.content.record_view(1, "viewer").await);
    assert!(!engine.content.record_view(1, "viewer").await);

    tokio::time::advance(Duration::from_secs(31)).await;

    assert!(engine.content.record_view(1, "viewer").await);
    assert_eq!(engine.score("article:view:ZSet", "1").await, Some(2.0));
}

#[tokio::test]
async fn distinct_viewers_each_count() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0)]);

    let outcomes = join_all(
        ["a", "b", "c"]
            .into_iter()
            .map(|viewer| engine.content.record_view(1, viewer)),
    )
    .await;

    assert_eq!(outcomes, vec![true, true, true]);
    assert_eq!(engine.score("article:view:ZSet", "1").await, Some(3.0));
}

#[tokio::test]
async fn unknown_article_is_not_counted() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0)]);

    assert!(!engine.content.record_view(99, "viewer").await);
    assert_eq!(engine.score("article:view:ZSet", "99").await, None);
    assert!(!engine.key_exists("99:viewer").await);
}

#[tokio::test]
async fn store_failure_is_swallowed() {
    let engine = engine();
    engine.seed([article(1, "rust", 0, 0)]);
    engine.store.set_offline(true);

    assert!(!engine.content.record_view(1, "viewer").await);
}
