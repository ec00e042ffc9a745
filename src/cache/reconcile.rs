//! Reconciliation between the fast store and the persistent store.
//!
//! Warm-up rebuilds the global time and view rankings from scratch. Flush
//! copies ranked view counts back into article rows; it only reads the fast
//! store and overwrites rows by id, so repeating it is harmless.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument, warn};

use crate::application::repos::ArticlesRepo;

use super::error::EngineError;
use super::keys::{IndexKey, member};
use super::record::unix_millis;
use super::store::{FastStore, ScoredMember};

const METRIC_WARMUP_MS: &str = "metablog_warmup_ms";
const METRIC_FLUSH_MS: &str = "metablog_flush_ms";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmUpReport {
    pub articles: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Ranked members read from the view index.
    pub ranked: usize,
    /// Rows whose view count was written.
    pub written: usize,
    /// Ranked members with no matching row.
    pub missing: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn FastStore>,
    articles: Arc<dyn ArticlesRepo>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn FastStore>, articles: Arc<dyn ArticlesRepo>) -> Self {
        Self { store, articles }
    }

    /// Deletes the global time and view sets and repopulates both from one
    /// scan of the article table.
    #[instrument(skip(self))]
    pub async fn warm_up(&self) -> Result<WarmUpReport, EngineError> {
        let started_at = Instant::now();
        let by_time = IndexKey::ArticlesByTime.to_string();
        let by_view = IndexKey::ArticlesByView.to_string();

        self.store
            .delete(&[by_time.clone(), by_view.clone()])
            .await?;

        let stamps = self.articles.list_stamps().await?;
        let (time_entries, view_entries): (Vec<_>, Vec<_>) = stamps
            .iter()
            .map(|stamp| {
                (
                    ScoredMember {
                        member: member(stamp.id),
                        score: unix_millis(stamp.created_at) as f64,
                    },
                    ScoredMember {
                        member: member(stamp.id),
                        score: stamp.view_count as f64,
                    },
                )
            })
            .unzip();

        self.store.sorted_add(&by_time, time_entries).await?;
        self.store.sorted_add(&by_view, view_entries).await?;

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_WARMUP_MS).record(elapsed_ms);
        info!(
            target = "metablog::cache::reconcile",
            articles = stamps.len(),
            elapsed_ms,
            "Warmed up article rankings"
        );
        Ok(WarmUpReport {
            articles: stamps.len(),
        })
    }

    /// Writes every ranked view count back to its article row.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<FlushReport, EngineError> {
        let started_at = Instant::now();
        let ranked = self
            .store
            .sorted_range_desc(&IndexKey::ArticlesByView.to_string(), 0, -1)
            .await?;

        let mut report = FlushReport {
            ranked: ranked.len(),
            ..FlushReport::default()
        };
        for entry in ranked {
            let Ok(id) = entry.member.parse() else {
                warn!(
                    target = "metablog::cache::reconcile",
                    member = %entry.member,
                    "Skipping non-numeric view ranking member"
                );
                continue;
            };
            if self
                .articles
                .update_view_count(id, entry.score as i64)
                .await?
            {
                report.written += 1;
            } else {
                report.missing += 1;
            }
        }

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_FLUSH_MS).record(elapsed_ms);
        info!(
            target = "metablog::cache::reconcile",
            ranked = report.ranked,
            written = report.written,
            missing = report.missing,
            elapsed_ms,
            "Flushed view counts"
        );
        Ok(report)
    }
}
