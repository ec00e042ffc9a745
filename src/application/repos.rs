//! Repository traits describing persistence adapters.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::articles::{ArticleDraft, LinkDraft};
use crate::domain::entities::{
    ArticleRecord, ArticleStamp, EntityId, LinkRecord, TagArticleCount, TagArticleStamp, TagRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Insert request for a new article. The tag is resolved by name inside the
/// same transaction; `candidate_tag_id` is used when the tag is new.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub id: EntityId,
    pub candidate_tag_id: EntityId,
    pub draft: ArticleDraft,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ArticleUpdate {
    pub id: EntityId,
    pub candidate_tag_id: EntityId,
    pub draft: ArticleDraft,
    /// Latest ranked view count, written with the update when known.
    pub view_count: Option<i64>,
    pub updated_at: OffsetDateTime,
}

/// Result of an update: the new row plus the tag it belonged to before.
#[derive(Debug, Clone)]
pub struct ArticleChange {
    pub record: ArticleRecord,
    pub previous_tag_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleSearchPage {
    pub records: Vec<ArticleRecord>,
    pub total: u64,
}

/// One reclassification, applied as a single transaction.
#[derive(Debug, Clone)]
pub struct ReclassifyPlan {
    pub article_ids: Vec<EntityId>,
    pub tag_name: String,
    pub candidate_tag_id: EntityId,
    /// Ranked view counts copied into the rows before commit.
    pub view_counts: Vec<(EntityId, i64)>,
}

#[derive(Debug, Clone)]
pub struct ReclassifyOutcome {
    pub tag: TagRecord,
    pub tag_created: bool,
    /// Distinct tag names the moved articles belonged to before the move.
    pub previous_tag_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewLink {
    pub id: EntityId,
    pub draft: LinkDraft,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<ArticleRecord>, RepoError>;
    async fn find_by_ids(&self, ids: &[EntityId]) -> Result<Vec<ArticleRecord>, RepoError>;
    async fn list_stamps(&self) -> Result<Vec<ArticleStamp>, RepoError>;
    async fn list_by_tag_name(&self, tag_name: &str) -> Result<Vec<TagArticleStamp>, RepoError>;
    /// Returns `false` when no article has the id.
    async fn update_view_count(&self, id: EntityId, view_count: i64) -> Result<bool, RepoError>;
    /// Case-insensitive title substring search, newest first.
    async fn search_by_title(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<ArticleSearchPage, RepoError>;
    async fn create_article(&self, article: NewArticle) -> Result<ArticleRecord, RepoError>;
    async fn update_article(&self, update: ArticleUpdate) -> Result<ArticleChange, RepoError>;
    async fn delete_article(&self, id: EntityId) -> Result<Option<ArticleRecord>, RepoError>;
    /// Moves every listed article to the named tag, creating it if needed.
    /// Fails with [`RepoError::NotFound`] and changes nothing when any id is
    /// unknown.
    async fn reclassify(&self, plan: ReclassifyPlan) -> Result<ReclassifyOutcome, RepoError>;
}

#[async_trait]
pub trait TagsRepo: Send + Sync {
    /// Returns the tag and whether it was created by this call.
    async fn find_or_create(
        &self,
        name: &str,
        candidate_id: EntityId,
    ) -> Result<(TagRecord, bool), RepoError>;
    /// Tags owning at least one article, with their article counts.
    async fn article_counts(&self) -> Result<Vec<TagArticleCount>, RepoError>;
}

#[async_trait]
pub trait LinksRepo: Send + Sync {
    async fn list_all(&self) -> Result<Vec<LinkRecord>, RepoError>;
    async fn find_by_id(&self, id: EntityId) -> Result<Option<LinkRecord>, RepoError>;
    async fn create_link(&self, link: NewLink) -> Result<LinkRecord, RepoError>;
    async fn update_link(
        &self,
        id: EntityId,
        draft: LinkDraft,
        updated_at: OffsetDateTime,
    ) -> Result<Option<LinkRecord>, RepoError>;
    async fn delete_link(&self, id: EntityId) -> Result<bool, RepoError>;
}

/// The persistent-store handles the engine depends on.
#[derive(Clone)]
pub struct RepositorySet {
    pub articles: Arc<dyn ArticlesRepo>,
    pub tags: Arc<dyn TagsRepo>,
    pub links: Arc<dyn LinksRepo>,
}

impl RepositorySet {
    /// Uses one adapter for every repository trait.
    pub fn from_shared<R>(repos: Arc<R>) -> Self
    where
        R: ArticlesRepo + TagsRepo + LinksRepo + 'static,
    {
        Self {
            articles: repos.clone(),
            tags: repos.clone(),
            links: repos,
        }
    }
}
