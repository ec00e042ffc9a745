//! Ranking index: score-ordered sets read in descending order.
//!
//! A set is either absent or complete. Reads of an absent set rebuild it from
//! the persistent store first. Rebuilds only add members that are missing, so
//! concurrent rebuilds of the same set converge on one result and never
//! overwrite a score that moved after the set was created.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use crate::application::repos::{ArticlesRepo, LinksRepo, TagsRepo};
use crate::domain::entities::EntityId;

use super::error::EngineError;
use super::keys::{IndexKey, member};
use super::record::unix_millis;
use super::store::{FastStore, ScoredMember, StoreError};

const METRIC_RANKING_REBUILD: &str = "metablog_ranking_rebuild_total";
const READ_ATTEMPTS: usize = 2;

/// Members of one ranked read plus the cardinality of the whole set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedSlice {
    pub members: Vec<ScoredMember>,
    pub total: u64,
}

impl RankedSlice {
    /// Members parsed as entity ids, in rank order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.members
            .iter()
            .filter_map(|entry| match entry.member.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(
                        target = "metablog::cache::ranking",
                        member = %entry.member,
                        "Skipping non-numeric ranking member"
                    );
                    None
                }
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct RankingIndex {
    store: Arc<dyn FastStore>,
    articles: Arc<dyn ArticlesRepo>,
    tags: Arc<dyn TagsRepo>,
    links: Arc<dyn LinksRepo>,
}

impl RankingIndex {
    pub fn new(
        store: Arc<dyn FastStore>,
        articles: Arc<dyn ArticlesRepo>,
        tags: Arc<dyn TagsRepo>,
        links: Arc<dyn LinksRepo>,
    ) -> Self {
        Self {
            store,
            articles,
            tags,
            links,
        }
    }

    /// Reads ranks `start..=stop`, highest score first, rebuilding the set
    /// when absent.
    ///
    /// An invalidation may drop the set between the rebuild and the read. A
    /// read that finds the set gone rebuilds it once more.
    pub async fn range(
        &self,
        key: &IndexKey,
        start: i64,
        stop: i64,
    ) -> Result<RankedSlice, EngineError> {
        let name = key.to_string();
        let mut slice = RankedSlice::default();
        for attempt in 1..=READ_ATTEMPTS {
            if self.ensure(key).await? == 0 {
                return Ok(RankedSlice::default());
            }
            let members = self.store.sorted_range_desc(&name, start, stop).await?;
            let total = self.store.sorted_card(&name).await?;
            slice = RankedSlice { members, total };
            if total > 0 || attempt == READ_ATTEMPTS {
                break;
            }
            warn!(
                target = "metablog::cache::ranking",
                key = %key,
                "Ranking set dropped while reading; rebuilding"
            );
        }
        Ok(slice)
    }

    /// Makes sure the set exists and returns its cardinality.
    ///
    /// A per-tag set whose source relation is empty is reported as
    /// [`EngineError::NotFound`]; the global sets are simply empty.
    pub async fn ensure(&self, key: &IndexKey) -> Result<u64, EngineError> {
        let name = key.to_string();
        if self.store.exists(&name).await? {
            // zero here means the set was dropped after the existence check
            let present = self.store.sorted_card(&name).await?;
            if present > 0 {
                return Ok(present);
            }
        }

        let rebuilt = self.rebuild(key).await?;
        if rebuilt == 0 {
            if let IndexKey::TagArticles(tag) = key {
                return Err(EngineError::not_found("tag", tag));
            }
            return Ok(0);
        }
        Ok(self.store.sorted_card(&name).await?)
    }

    /// Repopulates `key` from its defining relation and returns the number of
    /// source rows.
    pub async fn rebuild(&self, key: &IndexKey) -> Result<usize, EngineError> {
        let entries = self.source_entries(key).await?;
        let rows = entries.len();
        let added = self.store.sorted_add(&key.to_string(), entries).await?;

        counter!(METRIC_RANKING_REBUILD, "family" => key.family()).increment(1);
        info!(
            target = "metablog::cache::ranking",
            key = %key,
            rows,
            added,
            "Rebuilt ranking set"
        );
        Ok(rows)
    }

    async fn source_entries(&self, key: &IndexKey) -> Result<Vec<ScoredMember>, EngineError> {
        let entries = match key {
            IndexKey::ArticlesByTime => self
                .articles
                .list_stamps()
                .await?
                .into_iter()
                .map(|stamp| scored(member(stamp.id), unix_millis(stamp.created_at) as f64))
                .collect(),
            IndexKey::ArticlesByView => self
                .articles
                .list_stamps()
                .await?
                .into_iter()
                .map(|stamp| scored(member(stamp.id), stamp.view_count as f64))
                .collect(),
            IndexKey::TagArticles(tag) => self
                .articles
                .list_by_tag_name(tag)
                .await?
                .into_iter()
                .map(|stamp| scored(member(stamp.id), unix_millis(stamp.created_at) as f64))
                .collect(),
            IndexKey::TagArticleCounts => self
                .tags
                .article_counts()
                .await?
                .into_iter()
                .filter(|row| row.count > 0)
                .map(|row| scored(row.name, row.count as f64))
                .collect(),
            IndexKey::Links => self
                .links
                .list_all()
                .await?
                .into_iter()
                .map(|link| scored(member(link.id), unix_millis(link.updated_at) as f64))
                .collect(),
        };
        Ok(entries)
    }

    /// Patches one member into an existing set. An absent set stays absent
    /// and picks the member up on its next rebuild.
    pub async fn add(&self, key: &IndexKey, score: f64, entry: &str) -> Result<bool, StoreError> {
        self.store
            .sorted_set_if_present(&key.to_string(), entry, score)
            .await
    }

    pub async fn remove(&self, key: &IndexKey, entry: &str) -> Result<bool, StoreError> {
        self.store.sorted_remove(&key.to_string(), entry).await
    }

    pub async fn cardinality(&self, key: &IndexKey) -> Result<u64, StoreError> {
        self.store.sorted_card(&key.to_string()).await
    }

    pub async fn score_of(&self, key: &IndexKey, entry: &str) -> Result<Option<f64>, StoreError> {
        self.store.sorted_score(&key.to_string(), entry).await
    }
}

fn scored(member: String, score: f64) -> ScoredMember {
    ScoredMember { member, score }
}
