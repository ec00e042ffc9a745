use std::{process, sync::Arc, time::Duration};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use metablog::{
    application::{
        content::ContentService,
        error::AppError,
        jobs::{JobWorkerContext, flush_views_schedule, process_flush_views_job, run_warm_up},
        repos::RepositorySet,
    },
    cache::{CacheConfig, FastStore, MemoryStore},
    config,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => {
            let context = build_job_context(&settings).await?;
            run_serve(&settings, context).await
        }
    }
}

async fn run_serve(settings: &config::Settings, context: JobWorkerContext) -> Result<(), AppError> {
    let schedule = flush_views_schedule(&settings.jobs.flush_schedule)?;

    let report = run_warm_up(&context).await?;
    info!(articles = report.articles, "Ranking indexes warmed");

    let flush_worker = WorkerBuilder::new("flush-views-worker")
        .data(context)
        .backend(CronStream::new(schedule))
        .build_fn(process_flush_views_job);

    let monitor = Monitor::new().register(flush_worker);
    let monitor_handle = tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    });

    info!(
        schedule = %settings.jobs.flush_schedule,
        "View flush scheduled; waiting for shutdown signal"
    );

    let result = tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)));

    info!("Shutdown signal received");
    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn build_job_context(settings: &config::Settings) -> Result<JobWorkerContext, AppError> {
    let repositories = init_repositories(settings).await?;
    let store: Arc<dyn FastStore> = Arc::new(MemoryStore::new());
    let content = ContentService::new(
        store,
        RepositorySet::from_shared(repositories),
        CacheConfig::from(&settings.cache),
    );

    Ok(JobWorkerContext {
        content: Arc::new(content),
    })
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err.to_string())))?;

    let repositories = PostgresRepositories::new(pool);
    tokio::time::timeout(Duration::from_secs(5), repositories.health_check())
        .await
        .map_err(|_| AppError::from(InfraError::database("health check timed out")))?
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(repositories))
}
