//! Reader-facing content service: ranked pages, article detail, views and
//! the derived lists built on the ranking index.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::{format_description::BorrowedFormatItem, macros::format_description};
use tracing::{instrument, warn};

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{ArticlesRepo, LinksRepo, RepositorySet};
use crate::cache::{
    CacheConfig, EngineError, FastStore, FlushReport, IndexKey, Invalidation, RankingIndex,
    RecordCache, RecordKind, Reconciler, ViewAccounting, WarmUpReport, display_timestamp, member,
};
use crate::domain::entities::{ArticleRecord, EntityId, LinkRecord};

const TIMELINE_STAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[month]-[day] [hour]:[minute]");

/// Global orderings available to paged reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    Time,
    View,
}

impl RankOrder {
    fn index(self) -> IndexKey {
        match self {
            Self::Time => IndexKey::ArticlesByTime,
            Self::View => IndexKey::ArticlesByView,
        }
    }
}

/// Article as listed on paged views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub id: EntityId,
    pub title: String,
    pub description: String,
    pub view_count: i64,
    pub tag_name: String,
    pub created: String,
}

impl From<&ArticleRecord> for ArticleSummary {
    fn from(record: &ArticleRecord) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
            view_count: record.view_count,
            tag_name: record.tag_name.clone(),
            created: display_timestamp(record.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotArticle {
    pub id: EntityId,
    pub title: String,
    pub view_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub id: EntityId,
    pub title: String,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineYear {
    pub year: i32,
    pub articles: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub name: String,
    pub article_count: i64,
}

#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn FastStore>,
    articles: Arc<dyn ArticlesRepo>,
    links: Arc<dyn LinksRepo>,
    records: RecordCache,
    ranking: RankingIndex,
    views: ViewAccounting,
    reconciler: Reconciler,
    config: CacheConfig,
}

impl ContentService {
    pub fn new(store: Arc<dyn FastStore>, repos: RepositorySet, config: CacheConfig) -> Self {
        let ranking = RankingIndex::new(
            store.clone(),
            repos.articles.clone(),
            repos.tags.clone(),
            repos.links.clone(),
        );
        Self {
            records: RecordCache::new(store.clone()),
            views: ViewAccounting::new(store.clone(), ranking.clone(), config.view_cooldown()),
            reconciler: Reconciler::new(store.clone(), repos.articles.clone()),
            ranking,
            store,
            articles: repos.articles,
            links: repos.links,
            config,
        }
    }

    /// One page of all articles, newest or most viewed first.
    pub async fn page(
        &self,
        order: RankOrder,
        request: PageRequest,
    ) -> Result<Page<ArticleSummary>, EngineError> {
        self.within_request("page", self.ranked_page(&order.index(), request))
            .await
    }

    /// One page of a tag's articles, newest first.
    pub async fn page_by_tag(
        &self,
        tag_name: &str,
        request: PageRequest,
    ) -> Result<Page<ArticleSummary>, EngineError> {
        let key = IndexKey::tag_articles(tag_name.trim());
        self.within_request("page_by_tag", self.ranked_page(&key, request))
            .await
    }

    pub async fn article_detail(&self, id: EntityId) -> Result<ArticleRecord, EngineError> {
        self.within_request(
            "article_detail",
            self.records.get_or_load(id, |id| self.load_article(id)),
        )
        .await
    }

    /// Counts a view of `article_id` by `viewer_id`. Never fails; returns
    /// whether the view was counted.
    pub async fn record_view(&self, article_id: EntityId, viewer_id: &str) -> bool {
        match tokio::time::timeout(
            self.config.request_timeout(),
            self.views.record_view(article_id, viewer_id),
        )
        .await
        {
            Ok(counted) => counted,
            Err(_) => {
                warn!(
                    target = "metablog::application::content",
                    article_id, "View accounting exceeded its deadline"
                );
                false
            }
        }
    }

    /// Drops the record-cache entry for one entity.
    pub async fn invalidate(&self, kind: RecordKind, id: EntityId) -> Result<(), EngineError> {
        self.within_request("invalidate", async {
            Invalidation::new()
                .record(kind, id)
                .apply(self.store.as_ref())
                .await?;
            Ok(())
        })
        .await
    }

    /// The most viewed articles.
    pub async fn hot_articles(&self) -> Result<Vec<HotArticle>, EngineError> {
        self.within_request("hot_articles", async {
            let count = self.config.hot_article_count.max(1) as i64;
            let slice = self
                .ranking
                .range(&IndexKey::ArticlesByView, 0, count - 1)
                .await?;
            let scores: HashMap<String, f64> = slice
                .members
                .iter()
                .map(|entry| (entry.member.clone(), entry.score))
                .collect();
            let records = self.load_articles(&slice.ids()).await?;
            Ok(records
                .into_iter()
                .map(|record| HotArticle {
                    view_count: scores
                        .get(&member(record.id))
                        .map_or(record.view_count, |score| *score as i64),
                    id: record.id,
                    title: record.title,
                })
                .collect())
        })
        .await
    }

    /// Every article grouped by creation year, newest first.
    pub async fn timeline(&self) -> Result<Vec<TimelineYear>, EngineError> {
        self.within_request("timeline", async {
            let slice = self.ranking.range(&IndexKey::ArticlesByTime, 0, -1).await?;
            let records = self.load_articles(&slice.ids()).await?;

            let mut years: Vec<TimelineYear> = Vec::new();
            for record in records {
                let year = record.created_at.year();
                let entry = TimelineEntry {
                    id: record.id,
                    created: record
                        .created_at
                        .format(TIMELINE_STAMP)
                        .unwrap_or_else(|_| display_timestamp(record.created_at)),
                    title: record.title,
                };
                match years.last_mut() {
                    Some(group) if group.year == year => group.articles.push(entry),
                    _ => years.push(TimelineYear {
                        year,
                        articles: vec![entry],
                    }),
                }
            }
            Ok(years)
        })
        .await
    }

    /// Case-insensitive title search with a fixed page size.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        page: u32,
    ) -> Result<Page<ArticleSummary>, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::inconsistent("search query is empty"));
        }
        if page == 0 {
            return Err(EngineError::inconsistent("page numbers start at 1"));
        }
        let limit = self.config.search_page_size.max(1) as u32;
        let offset = (page - 1).saturating_mul(limit);

        self.within_request("search", async {
            let found = self.articles.search_by_title(query, limit, offset).await?;
            let mut items = Vec::with_capacity(found.records.len());
            for record in &found.records {
                let mut summary = ArticleSummary::from(record);
                if let Some(score) = self
                    .ranking
                    .score_of(&IndexKey::ArticlesByView, &member(record.id))
                    .await?
                {
                    summary.view_count = score as i64;
                }
                items.push(summary);
            }
            Ok(Page {
                items,
                total: found.total,
            })
        })
        .await
    }

    /// Tags owning at least one article, most articles first.
    pub async fn tags(&self) -> Result<Vec<TagSummary>, EngineError> {
        self.within_request("tags", async {
            let slice = self
                .ranking
                .range(&IndexKey::TagArticleCounts, 0, -1)
                .await?;
            Ok(slice
                .members
                .into_iter()
                .map(|entry| TagSummary {
                    name: entry.member,
                    article_count: entry.score as i64,
                })
                .collect())
        })
        .await
    }

    /// Links, most recently updated first.
    pub async fn links(&self) -> Result<Vec<LinkRecord>, EngineError> {
        self.within_request("links", async {
            let slice = self.ranking.range(&IndexKey::Links, 0, -1).await?;
            let mut links = Vec::with_capacity(slice.members.len());
            for id in slice.ids() {
                let loaded = self
                    .records
                    .get_or_load(id, |id| self.load_link(id))
                    .await;
                match loaded {
                    Ok(link) => links.push(link),
                    Err(err) if err.is_not_found() => warn!(
                        target = "metablog::application::content",
                        link_id = id,
                        "Ranked link has no backing row"
                    ),
                    Err(err) => return Err(err),
                }
            }
            Ok(links)
        })
        .await
    }

    /// Rebuilds the global rankings; bounded by the warm-up deadline.
    pub async fn warm_up(&self) -> Result<WarmUpReport, EngineError> {
        within(
            "warm_up",
            self.config.warmup_timeout(),
            self.reconciler.warm_up(),
        )
        .await
    }

    /// Persists ranked view counts; bounded by the flush deadline.
    pub async fn flush(&self) -> Result<FlushReport, EngineError> {
        within("flush", self.config.flush_timeout(), self.reconciler.flush()).await
    }

    async fn ranked_page(
        &self,
        key: &IndexKey,
        request: PageRequest,
    ) -> Result<Page<ArticleSummary>, EngineError> {
        let slice = self
            .ranking
            .range(key, request.start(), request.stop())
            .await?;
        if slice.total == 0 {
            return Ok(Page::empty());
        }
        let records = self.load_articles(&slice.ids()).await?;
        Ok(Page {
            items: records.iter().map(ArticleSummary::from).collect(),
            total: slice.total,
        })
    }

    /// Reads records for `ids` in order, batching every miss into one
    /// persistent-store query. Ranked ids without a row are skipped.
    async fn load_articles(&self, ids: &[EntityId]) -> Result<Vec<ArticleRecord>, EngineError> {
        let mut found: HashMap<EntityId, ArticleRecord> = HashMap::with_capacity(ids.len());
        let mut misses = Vec::new();
        for id in ids {
            match self.records.get::<ArticleRecord>(*id).await? {
                Some(record) => {
                    found.insert(*id, record);
                }
                None => misses.push(*id),
            }
        }

        if !misses.is_empty() {
            for record in self.articles.find_by_ids(&misses).await? {
                let record = self.with_ranked_views(record).await?;
                if let Err(err) = self.records.put(&record).await {
                    warn!(
                        target = "metablog::application::content",
                        article_id = record.id,
                        error = %err,
                        "Failed to repopulate record cache entry"
                    );
                }
                found.insert(record.id, record);
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| {
                let record = found.remove(id);
                if record.is_none() {
                    warn!(
                        target = "metablog::application::content",
                        article_id = id,
                        "Ranked article has no backing row"
                    );
                }
                record
            })
            .collect())
    }

    async fn load_article(&self, id: EntityId) -> Result<Option<ArticleRecord>, EngineError> {
        match self.articles.find_by_id(id).await? {
            Some(record) => Ok(Some(self.with_ranked_views(record).await?)),
            None => Ok(None),
        }
    }

    async fn load_link(&self, id: EntityId) -> Result<Option<LinkRecord>, EngineError> {
        Ok(self.links.find_by_id(id).await?)
    }

    /// The ranked view score is authoritative between flushes.
    async fn with_ranked_views(&self, mut record: ArticleRecord) -> Result<ArticleRecord, EngineError> {
        if let Some(score) = self
            .ranking
            .score_of(&IndexKey::ArticlesByView, &member(record.id))
            .await?
        {
            record.view_count = score as i64;
        }
        Ok(record)
    }

    async fn within_request<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        within(operation, self.config.request_timeout(), future).await
    }
}

pub(crate) async fn within<T>(
    operation: &'static str,
    deadline: Duration,
    future: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| EngineError::Timeout { operation })?
}
