//! Content cache-and-ranking engine.
//!
//! - **Record cache**: one field map per article or link, repaired on read miss
//! - **Ranking index**: score-ordered sets by time, views, tag and link update
//! - **View accounting**: deduplicated, atomic view increments
//! - **Reconciliation**: startup warm-up and scheduled view-count flush
//! - **Reclassification**: transactional tag rename/merge with invalidation
//!
//! All state lives behind the [`FastStore`] handle injected at construction.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! view_cooldown_secs = 30
//! request_timeout_ms = 2000
//! hot_article_count = 3
//! # ... see config.rs for all options
//! ```

mod config;
mod error;
mod invalidation;
mod keys;
mod lock;
mod memory;
mod ranking;
mod reclassify;
mod reconcile;
mod record;
mod store;
mod views;

pub use config::CacheConfig;
pub use error::EngineError;
pub use invalidation::Invalidation;
pub use keys::{IndexKey, RecordKey, RecordKind, member, view_marker_key};
pub use memory::MemoryStore;
pub use ranking::{RankedSlice, RankingIndex};
pub use reclassify::{Reclassifier, ReclassifyReport};
pub use reconcile::{FlushReport, Reconciler, WarmUpReport};
pub use record::{
    CachedRecord, DecodeError, RecordCache, VIEW_COUNT_FIELD, display_timestamp, unix_millis,
};
pub use store::{FastStore, FieldMap, ScoredMember, StoreError, ViewKeys, ViewOutcome};
pub use views::ViewAccounting;
