use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "metablog_record_cache_hit_total",
            Unit::Count,
            "Record-cache reads served from the fast store."
        );
        describe_counter!(
            "metablog_record_cache_miss_total",
            Unit::Count,
            "Record-cache reads that fell through to the persistent store."
        );
        describe_counter!(
            "metablog_ranking_rebuild_total",
            Unit::Count,
            "Ranking sets rebuilt from the persistent store, by key family."
        );
        describe_counter!(
            "metablog_view_counted_total",
            Unit::Count,
            "Article views that incremented the view ranking."
        );
        describe_counter!(
            "metablog_view_skipped_total",
            Unit::Count,
            "Article views not counted, by reason."
        );
        describe_histogram!(
            "metablog_warmup_ms",
            Unit::Milliseconds,
            "Ranking warm-up latency in milliseconds."
        );
        describe_histogram!(
            "metablog_flush_ms",
            Unit::Milliseconds,
            "View-count flush latency in milliseconds."
        );
    });
}
