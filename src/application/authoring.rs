//! Admin-facing write paths.
//!
//! Every mutation commits to the persistent store first and then drops the
//! derived cache state it touched through one [`Invalidation`].

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::content::within;
use crate::application::repos::{ArticleUpdate, NewArticle, NewLink, RepoError, RepositorySet};
use crate::cache::{
    CacheConfig, EngineError, FastStore, IndexKey, Invalidation, RankingIndex, RecordKind,
    Reclassifier, ReclassifyReport, member, unix_millis,
};
use crate::domain::articles::{ArticleDraft, LinkDraft};
use crate::domain::entities::{ArticleRecord, EntityId, LinkRecord};
use crate::domain::ids::IdGenerator;

#[derive(Clone)]
pub struct AuthoringService {
    store: Arc<dyn FastStore>,
    repos: RepositorySet,
    ranking: RankingIndex,
    reclassifier: Reclassifier,
    ids: Arc<IdGenerator>,
    config: CacheConfig,
}

impl AuthoringService {
    pub fn new(
        store: Arc<dyn FastStore>,
        repos: RepositorySet,
        ids: Arc<IdGenerator>,
        config: CacheConfig,
    ) -> Self {
        Self {
            ranking: RankingIndex::new(
                store.clone(),
                repos.articles.clone(),
                repos.tags.clone(),
                repos.links.clone(),
            ),
            reclassifier: Reclassifier::new(store.clone(), repos.articles.clone(), ids.clone()),
            store,
            repos,
            ids,
            config,
        }
    }

    pub async fn create_article(&self, draft: ArticleDraft) -> Result<ArticleRecord, EngineError> {
        let draft = draft.validated()?;
        let article = NewArticle {
            id: self.ids.next_id()?,
            candidate_tag_id: self.ids.next_id()?,
            draft,
            created_at: now_seconds(),
        };

        within("create_article", self.config.request_timeout(), async {
            let record = self
                .repos
                .articles
                .create_article(article)
                .await
                .map_err(duplicate_title)?;

            let entry = member(record.id);
            self.ranking
                .add(
                    &IndexKey::ArticlesByTime,
                    unix_millis(record.created_at) as f64,
                    &entry,
                )
                .await?;
            self.ranking
                .add(&IndexKey::ArticlesByView, record.view_count as f64, &entry)
                .await?;
            self.invalidate(
                Invalidation::new()
                    .tag_articles([record.tag_name.as_str()])
                    .index(IndexKey::TagArticleCounts),
            )
            .await?;

            info!(
                target = "metablog::application::authoring",
                article_id = record.id,
                tag = %record.tag_name,
                "Created article"
            );
            Ok(record)
        })
        .await
    }

    /// Rewrites an article. The current ranked view count is persisted with
    /// the update so the record reloads with it.
    pub async fn update_article(
        &self,
        id: EntityId,
        draft: ArticleDraft,
    ) -> Result<ArticleRecord, EngineError> {
        let draft = draft.validated()?;
        let candidate_tag_id = self.ids.next_id()?;

        within("update_article", self.config.request_timeout(), async {
            let view_count = self
                .ranking
                .score_of(&IndexKey::ArticlesByView, &member(id))
                .await?
                .map(|score| score as i64);
            let change = self
                .repos
                .articles
                .update_article(ArticleUpdate {
                    id,
                    candidate_tag_id,
                    draft,
                    view_count,
                    updated_at: now_seconds(),
                })
                .await
                .map_err(|err| match err {
                    RepoError::NotFound => EngineError::not_found("article", id),
                    other => duplicate_title(other),
                })?;

            self.invalidate(
                Invalidation::new()
                    .record(RecordKind::Article, id)
                    .tag_articles([
                        change.previous_tag_name.as_str(),
                        change.record.tag_name.as_str(),
                    ])
                    .index(IndexKey::TagArticleCounts),
            )
            .await?;

            info!(
                target = "metablog::application::authoring",
                article_id = id,
                tag = %change.record.tag_name,
                "Updated article"
            );
            Ok(change.record)
        })
        .await
    }

    pub async fn delete_article(&self, id: EntityId) -> Result<ArticleRecord, EngineError> {
        within("delete_article", self.config.request_timeout(), async {
            let record = self
                .repos
                .articles
                .delete_article(id)
                .await?
                .ok_or_else(|| EngineError::not_found("article", id))?;

            let entry = member(id);
            self.ranking.remove(&IndexKey::ArticlesByTime, &entry).await?;
            self.ranking.remove(&IndexKey::ArticlesByView, &entry).await?;
            self.invalidate(
                Invalidation::new()
                    .record(RecordKind::Article, id)
                    .tag_articles([record.tag_name.as_str()])
                    .index(IndexKey::TagArticleCounts),
            )
            .await?;

            info!(
                target = "metablog::application::authoring",
                article_id = id,
                "Deleted article"
            );
            Ok(record)
        })
        .await
    }

    /// Moves articles from `old_tag` to `new_tag`, creating the new tag when
    /// it does not exist yet.
    pub async fn reclassify(
        &self,
        article_ids: &[EntityId],
        old_tag: &str,
        new_tag: &str,
    ) -> Result<ReclassifyReport, EngineError> {
        within(
            "reclassify",
            self.config.request_timeout(),
            self.reclassifier.rename_or_merge(article_ids, old_tag, new_tag),
        )
        .await
    }

    pub async fn create_link(&self, draft: LinkDraft) -> Result<LinkRecord, EngineError> {
        let link = NewLink {
            id: self.ids.next_id()?,
            draft: draft.validated()?,
            created_at: now_seconds(),
        };
        within("create_link", self.config.request_timeout(), async {
            let record = self
                .repos
                .links
                .create_link(link)
                .await
                .map_err(duplicate_link)?;
            self.invalidate(Invalidation::new().index(IndexKey::Links))
                .await?;
            Ok(record)
        })
        .await
    }

    pub async fn update_link(
        &self,
        id: EntityId,
        draft: LinkDraft,
    ) -> Result<LinkRecord, EngineError> {
        let draft = draft.validated()?;
        within("update_link", self.config.request_timeout(), async {
            let record = self
                .repos
                .links
                .update_link(id, draft, now_seconds())
                .await
                .map_err(duplicate_link)?
                .ok_or_else(|| EngineError::not_found("link", id))?;
            self.invalidate(
                Invalidation::new()
                    .record(RecordKind::Link, id)
                    .index(IndexKey::Links),
            )
            .await?;
            Ok(record)
        })
        .await
    }

    pub async fn delete_link(&self, id: EntityId) -> Result<(), EngineError> {
        within("delete_link", self.config.request_timeout(), async {
            if !self.repos.links.delete_link(id).await? {
                return Err(EngineError::not_found("link", id));
            }
            self.invalidate(
                Invalidation::new()
                    .record(RecordKind::Link, id)
                    .index(IndexKey::Links),
            )
            .await?;
            Ok(())
        })
        .await
    }

    async fn invalidate(&self, invalidation: Invalidation) -> Result<(), EngineError> {
        if let Err(err) = invalidation.clone().apply(self.store.as_ref()).await {
            warn!(
                target = "metablog::application::authoring",
                keys = ?invalidation.keys(),
                error = %err,
                "Write committed but cache invalidation failed"
            );
            return Err(err.into());
        }
        Ok(())
    }
}

/// Persisted timestamps carry second precision.
fn now_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

fn duplicate_title(err: RepoError) -> EngineError {
    match err {
        RepoError::Duplicate { .. } => EngineError::inconsistent("an article with this title exists"),
        other => other.into(),
    }
}

fn duplicate_link(err: RepoError) -> EngineError {
    match err {
        RepoError::Duplicate { constraint } => {
            EngineError::inconsistent(format!("link violates unique constraint `{constraint}`"))
        }
        other => other.into(),
    }
}
