//! In-memory repositories implementing the persistent-store traits.
//!
//! Every write validates first and applies under a single lock, so a failed
//! call leaves the tables untouched, matching a rolled-back transaction.
//! [`MemoryRepositories::fail_next_write`] injects such a failure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{
    ArticleChange, ArticleSearchPage, ArticleUpdate, ArticlesRepo, LinksRepo, NewArticle, NewLink,
    ReclassifyOutcome, ReclassifyPlan, RepoError, TagsRepo,
};
use crate::domain::articles::LinkDraft;
use crate::domain::entities::{
    ArticleRecord, ArticleStamp, EntityId, LinkRecord, TagArticleCount, TagArticleStamp, TagRecord,
};

#[derive(Debug, Clone)]
struct StoredArticle {
    id: EntityId,
    title: String,
    description: String,
    content: String,
    view_count: i64,
    tag_id: EntityId,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct Tables {
    tags: BTreeMap<EntityId, TagRecord>,
    articles: BTreeMap<EntityId, StoredArticle>,
    links: BTreeMap<EntityId, LinkRecord>,
}

impl Tables {
    fn tag_by_name(&self, name: &str) -> Option<&TagRecord> {
        self.tags.values().find(|tag| tag.name == name)
    }

    fn tag_name(&self, tag_id: EntityId) -> String {
        self.tags
            .get(&tag_id)
            .map(|tag| tag.name.clone())
            .unwrap_or_default()
    }

    fn record(&self, article: &StoredArticle) -> ArticleRecord {
        ArticleRecord {
            id: article.id,
            title: article.title.clone(),
            description: article.description.clone(),
            content: article.content.clone(),
            view_count: article.view_count,
            tag_id: article.tag_id,
            tag_name: self.tag_name(article.tag_id),
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }

    fn find_or_create_tag(&mut self, name: &str, candidate_id: EntityId) -> (TagRecord, bool) {
        if let Some(tag) = self.tag_by_name(name) {
            return (tag.clone(), false);
        }
        let tag = TagRecord {
            id: candidate_id,
            name: name.to_string(),
        };
        self.tags.insert(candidate_id, tag.clone());
        (tag, true)
    }

    fn ensure_unique_title(&self, title: &str, except: Option<EntityId>) -> Result<(), RepoError> {
        let taken = self
            .articles
            .values()
            .any(|article| article.title == title && Some(article.id) != except);
        if taken {
            return Err(RepoError::Duplicate {
                constraint: "articles_title_key".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_unique_link(&self, draft: &LinkDraft, except: Option<EntityId>) -> Result<(), RepoError> {
        for link in self.links.values().filter(|link| Some(link.id) != except) {
            if link.name == draft.name {
                return Err(RepoError::Duplicate {
                    constraint: "links_name_key".to_string(),
                });
            }
            if link.url == draft.url {
                return Err(RepoError::Duplicate {
                    constraint: "links_url_key".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Persistent-store stand-in held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRepositories {
    tables: RwLock<Tables>,
    fail_next_write: AtomicBool,
    tag_scans: AtomicUsize,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next write fail as if its commit was rejected.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Inserts an article row as-is, creating its tag when the name is unseen.
    pub fn seed_article(&self, record: ArticleRecord) {
        let mut tables = self.write();
        let (tag, _) = tables.find_or_create_tag(&record.tag_name, record.tag_id);
        tables.articles.insert(
            record.id,
            StoredArticle {
                id: record.id,
                title: record.title,
                description: record.description,
                content: record.content,
                view_count: record.view_count,
                tag_id: tag.id,
                created_at: record.created_at,
                updated_at: record.updated_at,
            },
        );
    }

    pub fn seed_link(&self, link: LinkRecord) {
        self.write().links.insert(link.id, link);
    }

    /// Current row for `id`, bypassing every cache.
    pub fn article(&self, id: EntityId) -> Option<ArticleRecord> {
        let tables = self.read();
        tables.articles.get(&id).map(|article| tables.record(article))
    }

    pub fn tag_count(&self) -> usize {
        self.read().tags.len()
    }

    /// Number of per-tag membership scans served so far.
    pub fn tag_scans(&self) -> usize {
        self.tag_scans.load(Ordering::SeqCst)
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_write(&self) -> Result<(), RepoError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(RepoError::from_persistence("injected commit failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ArticlesRepo for MemoryRepositories {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<ArticleRecord>, RepoError> {
        Ok(self.article(id))
    }

    async fn find_by_ids(&self, ids: &[EntityId]) -> Result<Vec<ArticleRecord>, RepoError> {
        let tables = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| tables.articles.get(id))
            .map(|article| tables.record(article))
            .collect())
    }

    async fn list_stamps(&self) -> Result<Vec<ArticleStamp>, RepoError> {
        Ok(self
            .read()
            .articles
            .values()
            .map(|article| ArticleStamp {
                id: article.id,
                view_count: article.view_count,
                created_at: article.created_at,
            })
            .collect())
    }

    async fn list_by_tag_name(&self, tag_name: &str) -> Result<Vec<TagArticleStamp>, RepoError> {
        self.tag_scans.fetch_add(1, Ordering::SeqCst);
        let tables = self.read();
        let Some(tag) = tables.tag_by_name(tag_name) else {
            return Ok(Vec::new());
        };
        Ok(tables
            .articles
            .values()
            .filter(|article| article.tag_id == tag.id)
            .map(|article| TagArticleStamp {
                id: article.id,
                created_at: article.created_at,
            })
            .collect())
    }

    async fn update_view_count(&self, id: EntityId, view_count: i64) -> Result<bool, RepoError> {
        self.check_write()?;
        Ok(match self.write().articles.get_mut(&id) {
            Some(article) => {
                article.view_count = view_count.max(0);
                true
            }
            None => false,
        })
    }

    async fn search_by_title(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<ArticleSearchPage, RepoError> {
        let needle = query.to_lowercase();
        let tables = self.read();
        let mut matches: Vec<&StoredArticle> = tables
            .articles
            .values()
            .filter(|article| article.title.to_lowercase().contains(&needle))
            .collect();
        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(ArticleSearchPage {
            total: matches.len() as u64,
            records: matches
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|article| tables.record(article))
                .collect(),
        })
    }

    async fn create_article(&self, article: NewArticle) -> Result<ArticleRecord, RepoError> {
        self.check_write()?;
        let mut tables = self.write();
        tables.ensure_unique_title(&article.draft.title, None)?;
        let (tag, _) = tables.find_or_create_tag(&article.draft.tag_name, article.candidate_tag_id);
        let stored = StoredArticle {
            id: article.id,
            title: article.draft.title,
            description: article.draft.description,
            content: article.draft.content,
            view_count: 0,
            tag_id: tag.id,
            created_at: article.created_at,
            updated_at: article.created_at,
        };
        let record = tables.record(&stored);
        tables.articles.insert(stored.id, stored);
        Ok(record)
    }

    async fn update_article(&self, update: ArticleUpdate) -> Result<ArticleChange, RepoError> {
        self.check_write()?;
        let mut tables = self.write();
        let previous_tag_id = tables
            .articles
            .get(&update.id)
            .map(|article| article.tag_id)
            .ok_or(RepoError::NotFound)?;
        tables.ensure_unique_title(&update.draft.title, Some(update.id))?;
        let previous_tag_name = tables.tag_name(previous_tag_id);
        let (tag, _) = tables.find_or_create_tag(&update.draft.tag_name, update.candidate_tag_id);

        let article = tables
            .articles
            .get_mut(&update.id)
            .ok_or(RepoError::NotFound)?;
        article.title = update.draft.title;
        article.description = update.draft.description;
        article.content = update.draft.content;
        article.tag_id = tag.id;
        article.updated_at = update.updated_at;
        if let Some(count) = update.view_count {
            article.view_count = count.max(0);
        }
        let stored = article.clone();
        Ok(ArticleChange {
            record: tables.record(&stored),
            previous_tag_name,
        })
    }

    async fn delete_article(&self, id: EntityId) -> Result<Option<ArticleRecord>, RepoError> {
        self.check_write()?;
        let mut tables = self.write();
        Ok(tables
            .articles
            .remove(&id)
            .map(|article| tables.record(&article)))
    }

    async fn reclassify(&self, plan: ReclassifyPlan) -> Result<ReclassifyOutcome, RepoError> {
        self.check_write()?;
        let mut tables = self.write();
        if plan
            .article_ids
            .iter()
            .any(|id| !tables.articles.contains_key(id))
        {
            return Err(RepoError::NotFound);
        }

        let previous_tag_names: BTreeSet<String> = plan
            .article_ids
            .iter()
            .filter_map(|id| tables.articles.get(id))
            .map(|article| tables.tag_name(article.tag_id))
            .collect();
        let (tag, tag_created) = tables.find_or_create_tag(&plan.tag_name, plan.candidate_tag_id);

        for id in &plan.article_ids {
            if let Some(article) = tables.articles.get_mut(id) {
                article.tag_id = tag.id;
            }
        }
        for (id, count) in &plan.view_counts {
            if let Some(article) = tables.articles.get_mut(id) {
                article.view_count = (*count).max(0);
            }
        }

        Ok(ReclassifyOutcome {
            tag,
            tag_created,
            previous_tag_names: previous_tag_names.into_iter().collect(),
        })
    }
}

#[async_trait]
impl TagsRepo for MemoryRepositories {
    async fn find_or_create(
        &self,
        name: &str,
        candidate_id: EntityId,
    ) -> Result<(TagRecord, bool), RepoError> {
        self.check_write()?;
        Ok(self.write().find_or_create_tag(name, candidate_id))
    }

    async fn article_counts(&self) -> Result<Vec<TagArticleCount>, RepoError> {
        let tables = self.read();
        let mut counts: BTreeMap<EntityId, i64> = BTreeMap::new();
        for article in tables.articles.values() {
            *counts.entry(article.tag_id).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(tag_id, count)| TagArticleCount {
                name: tables.tag_name(tag_id),
                count,
            })
            .collect())
    }
}

#[async_trait]
impl LinksRepo for MemoryRepositories {
    async fn list_all(&self) -> Result<Vec<LinkRecord>, RepoError> {
        Ok(self.read().links.values().cloned().collect())
    }

    async fn find_by_id(&self, id: EntityId) -> Result<Option<LinkRecord>, RepoError> {
        Ok(self.read().links.get(&id).cloned())
    }

    async fn create_link(&self, link: NewLink) -> Result<LinkRecord, RepoError> {
        self.check_write()?;
        let mut tables = self.write();
        tables.ensure_unique_link(&link.draft, None)?;
        let record = LinkRecord {
            id: link.id,
            name: link.draft.name,
            url: link.draft.url,
            created_at: link.created_at,
            updated_at: link.created_at,
        };
        tables.links.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_link(
        &self,
        id: EntityId,
        draft: LinkDraft,
        updated_at: OffsetDateTime,
    ) -> Result<Option<LinkRecord>, RepoError> {
        self.check_write()?;
        let mut tables = self.write();
        if !tables.links.contains_key(&id) {
            return Ok(None);
        }
        tables.ensure_unique_link(&draft, Some(id))?;
        Ok(tables.links.get_mut(&id).map(|link| {
            link.name = draft.name;
            link.url = draft.url;
            link.updated_at = updated_at;
            link.clone()
        }))
    }

    async fn delete_link(&self, id: EntityId) -> Result<bool, RepoError> {
        self.check_write()?;
        Ok(self.write().links.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::articles::ArticleDraft;

    fn draft(title: &str, tag: &str) -> ArticleDraft {
        ArticleDraft {
            title: title.to_string(),
            description: String::new(),
            content: "body".to_string(),
            tag_name: tag.to_string(),
        }
    }

    #[tokio::test]
    async fn reclassify_with_unknown_id_changes_nothing() {
        let repos = MemoryRepositories::new();
        repos
            .create_article(NewArticle {
                id: 1,
                candidate_tag_id: 100,
                draft: draft("one", "old"),
                created_at: datetime!(2024-01-01 00:00:00 UTC),
            })
            .await
            .expect("create");

        let result = repos
            .reclassify(ReclassifyPlan {
                article_ids: vec![1, 2],
                tag_name: "new".to_string(),
                candidate_tag_id: 101,
                view_counts: vec![(1, 9)],
            })
            .await;

        assert!(matches!(result, Err(RepoError::NotFound)));
        let article = repos.article(1).expect("article");
        assert_eq!(article.tag_name, "old");
        assert_eq!(article.view_count, 0);
        assert_eq!(repos.tag_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_title_is_rejected() {
        let repos = MemoryRepositories::new();
        let at = datetime!(2024-01-01 00:00:00 UTC);
        repos
            .create_article(NewArticle {
                id: 1,
                candidate_tag_id: 100,
                draft: draft("same", "t"),
                created_at: at,
            })
            .await
            .expect("first");
        let second = repos
            .create_article(NewArticle {
                id: 2,
                candidate_tag_id: 101,
                draft: draft("same", "t"),
                created_at: at,
            })
            .await;
        assert!(matches!(second, Err(RepoError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_next_write() {
        let repos = MemoryRepositories::new();
        repos.fail_next_write();
        assert!(repos.update_view_count(1, 3).await.is_err());
        assert!(!repos.update_view_count(1, 3).await.expect("second write"));
    }
}
