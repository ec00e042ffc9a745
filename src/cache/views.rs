//! Deduplicated view counting.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::entities::EntityId;

use super::error::EngineError;
use super::keys::{IndexKey, RecordKey, member, view_marker_key};
use super::ranking::RankingIndex;
use super::record::VIEW_COUNT_FIELD;
use super::store::{FastStore, ViewKeys, ViewOutcome};

const METRIC_VIEW_COUNTED: &str = "metablog_view_counted_total";
const METRIC_VIEW_SKIPPED: &str = "metablog_view_skipped_total";

/// Counts at most one view per viewer per article per cooldown window.
#[derive(Clone)]
pub struct ViewAccounting {
    store: Arc<dyn FastStore>,
    ranking: RankingIndex,
    cooldown: Duration,
}

impl ViewAccounting {
    pub fn new(store: Arc<dyn FastStore>, ranking: RankingIndex, cooldown: Duration) -> Self {
        Self {
            store,
            ranking,
            cooldown,
        }
    }

    /// Records one view and reports whether it was counted.
    ///
    /// Store failures are logged and yield `false`; they never reach the
    /// caller serving the article.
    pub async fn record_view(&self, article_id: EntityId, viewer_id: &str) -> bool {
        match self.try_record_view(article_id, viewer_id).await {
            Ok(outcome) => {
                let counted = matches!(outcome, ViewOutcome::Counted(_));
                let label = match outcome {
                    ViewOutcome::Counted(_) => None,
                    ViewOutcome::Cooldown => Some("cooldown"),
                    ViewOutcome::Unranked => Some("unranked"),
                    ViewOutcome::UnknownMember => Some("unknown_member"),
                };
                match label {
                    None => counter!(METRIC_VIEW_COUNTED).increment(1),
                    Some(reason) => counter!(METRIC_VIEW_SKIPPED, "reason" => reason).increment(1),
                }
                debug!(
                    target = "metablog::cache::views",
                    article_id,
                    ?outcome,
                    "Processed article view"
                );
                counted
            }
            Err(err) => {
                counter!(METRIC_VIEW_SKIPPED, "reason" => "error").increment(1);
                warn!(
                    target = "metablog::cache::views",
                    article_id,
                    error = %err,
                    "View not counted"
                );
                false
            }
        }
    }

    /// Runs the atomic marker/field/score update. When the view index is
    /// absent it is rebuilt once and the update retried.
    pub async fn try_record_view(
        &self,
        article_id: EntityId,
        viewer_id: &str,
    ) -> Result<ViewOutcome, EngineError> {
        let marker = view_marker_key(article_id, viewer_id);
        let record = RecordKey::article(article_id).to_string();
        let index = IndexKey::ArticlesByView.to_string();
        let entry = member(article_id);
        let keys = ViewKeys {
            marker: &marker,
            cooldown: self.cooldown,
            record: &record,
            record_field: VIEW_COUNT_FIELD,
            index: &index,
            member: &entry,
        };

        match self.store.record_view(keys).await? {
            ViewOutcome::Unranked => {
                self.ranking.ensure(&IndexKey::ArticlesByView).await?;
                Ok(self.store.record_view(keys).await?)
            }
            outcome => Ok(outcome),
        }
    }
}
