//! Engine configuration.
//!
//! Controls view cooldowns, deadlines and read-path sizes via the `[cache]`
//! section of `metablog.toml`.

use std::time::Duration;

const DEFAULT_VIEW_COOLDOWN_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_WARMUP_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_HOT_ARTICLE_COUNT: usize = 3;
const DEFAULT_SEARCH_PAGE_SIZE: usize = 9;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Window during which a viewer is counted at most once per article.
    pub view_cooldown_secs: u64,
    /// Deadline applied to every public engine operation.
    pub request_timeout_ms: u64,
    /// Deadline for the startup warm-up job.
    pub warmup_timeout_secs: u64,
    /// Deadline for one flush run.
    pub flush_timeout_secs: u64,
    /// Number of entries in the hot-articles list.
    pub hot_article_count: usize,
    /// Fixed page size for title search.
    pub search_page_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            view_cooldown_secs: DEFAULT_VIEW_COOLDOWN_SECS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            warmup_timeout_secs: DEFAULT_WARMUP_TIMEOUT_SECS,
            flush_timeout_secs: DEFAULT_FLUSH_TIMEOUT_SECS,
            hot_article_count: DEFAULT_HOT_ARTICLE_COUNT,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            view_cooldown_secs: u64::from(settings.view_cooldown_secs.get()),
            request_timeout_ms: u64::from(settings.request_timeout_ms.get()),
            warmup_timeout_secs: u64::from(settings.warmup_timeout_secs.get()),
            flush_timeout_secs: u64::from(settings.flush_timeout_secs.get()),
            hot_article_count: settings.hot_article_count.get() as usize,
            search_page_size: settings.search_page_size.get() as usize,
        }
    }
}

impl CacheConfig {
    pub fn view_cooldown(&self) -> Duration {
        Duration::from_secs(self.view_cooldown_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_secs(self.warmup_timeout_secs.max(1))
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs.max(1))
    }
}
