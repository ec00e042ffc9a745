//! Reconciliation jobs: startup warm-up and the cron-triggered view flush.

use std::str::FromStr;

use apalis::prelude::*;
use apalis_cron::Schedule;
use tracing::{error, info, warn};

use crate::application::error::AppError;
use crate::cache::WarmUpReport;

use super::context::JobWorkerContext;

/// Daily at 03:00, with a leading seconds field.
pub const DEFAULT_FLUSH_SCHEDULE: &str = "0 0 3 * * *";

/// Marker struct for the cron-triggered flush.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct FlushViewsJob;

impl From<chrono::DateTime<chrono::Utc>> for FlushViewsJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

/// Flushes ranked view counts. Failures are logged and retried on the next
/// tick rather than reported to the worker.
pub async fn process_flush_views_job(
    _job: FlushViewsJob,
    ctx: Data<JobWorkerContext>,
) -> Result<(), Error> {
    match ctx.content.flush().await {
        Ok(report) => info!(
            target = "metablog::jobs::flush_views",
            written = report.written,
            missing = report.missing,
            "Flushed view counts"
        ),
        Err(err) => warn!(
            target = "metablog::jobs::flush_views",
            error = %err,
            "View flush failed; retrying on next schedule"
        ),
    }
    Ok(())
}

/// Runs the startup warm-up. Unlike the flush, a failure here is fatal.
pub async fn run_warm_up(ctx: &JobWorkerContext) -> Result<WarmUpReport, AppError> {
    ctx.content.warm_up().await.map_err(|err| {
        error!(
            target = "metablog::jobs::warm_up",
            error = %err,
            "Warm-up failed"
        );
        AppError::from(err)
    })
}

/// Parses the configured flush schedule (six fields, seconds first).
pub fn flush_views_schedule(expression: &str) -> Result<Schedule, AppError> {
    Schedule::from_str(expression).map_err(|err| {
        AppError::validation(format!("invalid flush schedule `{expression}`: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_parses() {
        let schedule = flush_views_schedule(DEFAULT_FLUSH_SCHEDULE).expect("schedule");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
        assert!(upcoming.iter().all(|at| at.format("%H:%M:%S").to_string() == "03:00:00"));
    }

    #[test]
    fn garbage_schedule_is_rejected() {
        assert!(flush_views_schedule("every night").is_err());
    }
}
