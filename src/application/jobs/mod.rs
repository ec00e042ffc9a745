mod context;
mod flush_views;

pub use context::JobWorkerContext;
pub use flush_views::{
    DEFAULT_FLUSH_SCHEDULE, FlushViewsJob, flush_views_schedule, process_flush_views_job,
    run_warm_up,
};
