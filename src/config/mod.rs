//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "metablog";
const ENV_PREFIX: &str = "METABLOG";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_VIEW_COOLDOWN_SECS: u32 = 30;
const DEFAULT_REQUEST_TIMEOUT_MS: u32 = 2_000;
const DEFAULT_WARMUP_TIMEOUT_SECS: u32 = 120;
const DEFAULT_FLUSH_TIMEOUT_SECS: u32 = 300;
const DEFAULT_HOT_ARTICLE_COUNT: u32 = 3;
const DEFAULT_SEARCH_PAGE_SIZE: u32 = 9;

/// Command-line arguments for the metablog binary.
#[derive(Debug, Parser)]
#[command(
    name = "metablog",
    version,
    about = "Blog content cache and ranking engine"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "METABLOG_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Warm the ranking indexes, then run the scheduled view flush until interrupted.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the per-viewer view cooldown.
    #[arg(long = "cache-view-cooldown-seconds", value_name = "SECONDS")]
    pub cache_view_cooldown_seconds: Option<u32>,

    /// Override the deadline applied to each engine request.
    #[arg(long = "cache-request-timeout-ms", value_name = "MILLIS")]
    pub cache_request_timeout_ms: Option<u32>,

    /// Override the warm-up deadline.
    #[arg(long = "cache-warmup-timeout-seconds", value_name = "SECONDS")]
    pub cache_warmup_timeout_seconds: Option<u32>,

    /// Override the flush deadline.
    #[arg(long = "cache-flush-timeout-seconds", value_name = "SECONDS")]
    pub cache_flush_timeout_seconds: Option<u32>,

    /// Override the number of hot articles listed.
    #[arg(long = "cache-hot-article-count", value_name = "COUNT")]
    pub cache_hot_article_count: Option<u32>,

    /// Override the cron expression driving the view flush.
    #[arg(long = "jobs-flush-schedule", value_name = "CRON")]
    pub jobs_flush_schedule: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub view_cooldown_secs: NonZeroU32,
    pub request_timeout_ms: NonZeroU32,
    pub warmup_timeout_secs: NonZeroU32,
    pub flush_timeout_secs: NonZeroU32,
    pub hot_article_count: NonZeroU32,
    pub search_page_size: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub flush_schedule: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    jobs: RawJobsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(value) = overrides.cache_view_cooldown_seconds {
            self.cache.view_cooldown_secs = Some(value);
        }
        if let Some(value) = overrides.cache_request_timeout_ms {
            self.cache.request_timeout_ms = Some(value);
        }
        if let Some(value) = overrides.cache_warmup_timeout_seconds {
            self.cache.warmup_timeout_secs = Some(value);
        }
        if let Some(value) = overrides.cache_flush_timeout_seconds {
            self.cache.flush_timeout_secs = Some(value);
        }
        if let Some(value) = overrides.cache_hot_article_count {
            self.cache.hot_article_count = Some(value);
        }
        if let Some(schedule) = overrides.jobs_flush_schedule.as_ref() {
            self.jobs.flush_schedule = Some(schedule.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            jobs,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            jobs: build_jobs_settings(jobs)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        view_cooldown_secs: non_zero_u32(
            cache
                .view_cooldown_secs
                .unwrap_or(DEFAULT_VIEW_COOLDOWN_SECS),
            "cache.view_cooldown_secs",
        )?,
        request_timeout_ms: non_zero_u32(
            cache
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            "cache.request_timeout_ms",
        )?,
        warmup_timeout_secs: non_zero_u32(
            cache
                .warmup_timeout_secs
                .unwrap_or(DEFAULT_WARMUP_TIMEOUT_SECS),
            "cache.warmup_timeout_secs",
        )?,
        flush_timeout_secs: non_zero_u32(
            cache
                .flush_timeout_secs
                .unwrap_or(DEFAULT_FLUSH_TIMEOUT_SECS),
            "cache.flush_timeout_secs",
        )?,
        hot_article_count: non_zero_u32(
            cache.hot_article_count.unwrap_or(DEFAULT_HOT_ARTICLE_COUNT),
            "cache.hot_article_count",
        )?,
        search_page_size: non_zero_u32(
            cache.search_page_size.unwrap_or(DEFAULT_SEARCH_PAGE_SIZE),
            "cache.search_page_size",
        )?,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let flush_schedule = match jobs.flush_schedule {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid(
                    "jobs.flush_schedule",
                    "cron expression must not be empty",
                ));
            }
            trimmed.to_string()
        }
        None => crate::application::jobs::DEFAULT_FLUSH_SCHEDULE.to_string(),
    };

    Ok(JobsSettings { flush_schedule })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    view_cooldown_secs: Option<u32>,
    request_timeout_ms: Option<u32>,
    warmup_timeout_secs: Option<u32>,
    flush_timeout_secs: Option<u32>,
    hot_article_count: Option<u32>,
    search_page_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    flush_schedule: Option<String>,
}

fn non_zero_u32(value: u32, key: &'static str) -> Result<NonZeroU32, LoadError> {
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
