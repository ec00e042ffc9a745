//! Shared fixtures: an engine wired to the in-memory store and repositories.

#![allow(dead_code)]

use std::sync::Arc;

use metablog::{
    application::{authoring::AuthoringService, content::ContentService, repos::RepositorySet},
    cache::{CacheConfig, FastStore, MemoryStore},
    domain::{
        articles::ArticleDraft,
        entities::{ArticleRecord, EntityId, LinkRecord},
        ids::IdGenerator,
    },
    infra::memory::MemoryRepositories,
};
use time::{Duration, OffsetDateTime, macros::datetime};

pub const T0: OffsetDateTime = datetime!(2024-03-01 08:00:00 UTC);

pub struct Engine {
    pub store: Arc<MemoryStore>,
    pub repos: Arc<MemoryRepositories>,
    pub content: ContentService,
    pub authoring: AuthoringService,
}

pub fn engine() -> Engine {
    engine_with(CacheConfig::default())
}

pub fn engine_with(config: CacheConfig) -> Engine {
    let store = Arc::new(MemoryStore::new());
    let repos = Arc::new(MemoryRepositories::new());
    let shared: Arc<dyn FastStore> = store.clone();
    let content = ContentService::new(
        shared.clone(),
        RepositorySet::from_shared(repos.clone()),
        config.clone(),
    );
    let authoring = AuthoringService::new(
        shared,
        RepositorySet::from_shared(repos.clone()),
        Arc::new(IdGenerator::new(7)),
        config,
    );
    Engine {
        store,
        repos,
        content,
        authoring,
    }
}

/// Article row `id` in `tag`, created `minutes` after [`T0`].
pub fn article(id: EntityId, tag: &str, views: i64, minutes: i64) -> ArticleRecord {
    let created_at = T0 + Duration::minutes(minutes);
    ArticleRecord {
        id,
        title: format!("article {id}"),
        description: format!("about {id}"),
        content: format!("body of {id}"),
        view_count: views,
        tag_id: 900_000 + id,
        tag_name: tag.to_string(),
        created_at,
        updated_at: created_at,
    }
}

pub fn link(id: EntityId, name: &str, minutes: i64) -> LinkRecord {
    let at = T0 + Duration::minutes(minutes);
    LinkRecord {
        id,
        name: name.to_string(),
        url: format!("https://{name}.example.com"),
        created_at: at,
        updated_at: at,
    }
}

pub fn draft(title: &str, tag: &str) -> ArticleDraft {
    ArticleDraft {
        title: title.to_string(),
        description: "short".to_string(),
        content: "long".to_string(),
        tag_name: tag.to_string(),
    }
}

impl Engine {
    pub fn seed(&self, records: impl IntoIterator<Item = ArticleRecord>) {
        for record in records {
            self.repos.seed_article(record);
        }
    }

    pub async fn key_exists(&self, key: &str) -> bool {
        self.store.exists(key).await.expect("store online")
    }

    pub async fn score(&self, key: &str, member: &str) -> Option<f64> {
        self.store
            .sorted_score(key, member)
            .await
            .expect("store online")
    }
}
