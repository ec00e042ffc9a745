//! Tag rename/merge.
//!
//! The persistent move commits first, as one transaction. Derived cache state
//! is dropped only after that commit succeeds, so a failed move leaves every
//! cache entry exactly as it was.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::application::repos::{ArticlesRepo, ReclassifyPlan, RepoError};
use crate::domain::articles::validate_tag_name;
use crate::domain::entities::{EntityId, TagRecord};
use crate::domain::ids::IdGenerator;

use super::error::EngineError;
use super::invalidation::Invalidation;
use super::keys::{IndexKey, RecordKind, member};
use super::store::FastStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclassifyReport {
    pub tag: TagRecord,
    pub tag_created: bool,
    pub moved: usize,
}

#[derive(Clone)]
pub struct Reclassifier {
    store: Arc<dyn FastStore>,
    articles: Arc<dyn ArticlesRepo>,
    ids: Arc<IdGenerator>,
}

impl Reclassifier {
    pub fn new(
        store: Arc<dyn FastStore>,
        articles: Arc<dyn ArticlesRepo>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            store,
            articles,
            ids,
        }
    }

    /// Moves `article_ids` from `old_tag` to `new_tag`.
    #[instrument(skip(self, article_ids), fields(articles = article_ids.len()))]
    pub async fn rename_or_merge(
        &self,
        article_ids: &[EntityId],
        old_tag: &str,
        new_tag: &str,
    ) -> Result<ReclassifyReport, EngineError> {
        let article_ids: Vec<EntityId> = article_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if article_ids.is_empty() {
            return Err(EngineError::inconsistent("no articles to reclassify"));
        }
        let old_tag = validate_tag_name(old_tag)?;
        let new_tag = validate_tag_name(new_tag)?;
        if old_tag == new_tag {
            return Err(EngineError::inconsistent(format!(
                "old and new tag are both `{new_tag}`"
            )));
        }

        let view_index = IndexKey::ArticlesByView.to_string();
        let mut view_counts = Vec::with_capacity(article_ids.len());
        for id in &article_ids {
            if let Some(score) = self.store.sorted_score(&view_index, &member(*id)).await? {
                view_counts.push((*id, score as i64));
            }
        }

        let plan = ReclassifyPlan {
            article_ids: article_ids.clone(),
            tag_name: new_tag.to_string(),
            candidate_tag_id: self.ids.next_id()?,
            view_counts,
        };
        let outcome = self.articles.reclassify(plan).await.map_err(|err| match err {
            RepoError::NotFound => {
                EngineError::inconsistent("article id list contains unknown articles")
            }
            other => EngineError::from(other),
        })?;

        let invalidation = Invalidation::new()
            .records(RecordKind::Article, article_ids.iter().copied())
            .tag_articles([old_tag, new_tag])
            .tag_articles(outcome.previous_tag_names.iter().map(String::as_str))
            .index(IndexKey::TagArticleCounts);
        if let Err(err) = invalidation.apply(self.store.as_ref()).await {
            error!(
                target = "metablog::cache::reclassify",
                error = %err,
                "Reclassification committed but cache invalidation failed"
            );
            return Err(err.into());
        }

        info!(
            target = "metablog::cache::reclassify",
            old_tag,
            new_tag,
            tag_id = outcome.tag.id,
            tag_created = outcome.tag_created,
            moved = article_ids.len(),
            "Reclassified articles"
        );
        Ok(ReclassifyReport {
            tag: outcome.tag,
            tag_created: outcome.tag_created,
            moved: article_ids.len(),
        })
    }
}
