//! Fast-store contract.
//!
//! The engine keeps its record cache, ranking index and view markers in a
//! key/value store offering hashes, score-ordered sets and expiring flags.
//! Every primitive here is atomic at the store; the engine layers no locks
//! of its own on top.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Field map of one record-cache entry.
pub type FieldMap = HashMap<String, String>;

/// A `(member, score)` pair read from an ordered set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("fast store unavailable: {message}")]
    Unavailable { message: String },
    #[error("key `{key}` holds a value of another type")]
    WrongType { key: String },
    #[error("fast store call timed out")]
    Timeout,
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType { key: key.into() }
    }
}

/// Everything [`FastStore::record_view`] touches for one counted view.
#[derive(Debug, Clone, Copy)]
pub struct ViewKeys<'a> {
    pub marker: &'a str,
    pub cooldown: Duration,
    pub record: &'a str,
    pub record_field: &'a str,
    pub index: &'a str,
    pub member: &'a str,
}

/// Result of the combined view-count operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewOutcome {
    /// Marker newly set; the index score now equals the payload.
    Counted(f64),
    /// The viewer was already counted within the cooldown window.
    Cooldown,
    /// The view index does not exist; nothing was written.
    Unranked,
    /// The view index exists but does not rank the member; nothing was written.
    UnknownMember,
}

#[async_trait]
pub trait FastStore: Send + Sync {
    /// Reads a whole hash. `None` when the key does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<Option<FieldMap>, StoreError>;

    /// Replaces the hash at `key` with `fields`.
    async fn hash_set_all(&self, key: &str, fields: Vec<(String, String)>)
    -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Deletes keys of any type, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Adds members that are not yet in the set. Existing members keep their
    /// score, so repeating an insert never changes the set. Returns the
    /// number of members added.
    async fn sorted_add(&self, key: &str, entries: Vec<ScoredMember>) -> Result<u64, StoreError>;

    /// Sets the score of one member only when the set already exists, so a
    /// single write never creates a partial set. Returns whether it wrote.
    async fn sorted_set_if_present(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<bool, StoreError>;

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;

    async fn sorted_card(&self, key: &str) -> Result<u64, StoreError>;

    /// Reads ranks `start..=stop` in descending score order. Negative ranks
    /// count from the end, so `(0, -1)` reads the whole set.
    async fn sorted_range_desc(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<ScoredMember>, StoreError>;

    /// Sets the dedup marker if absent and, only when newly set, increments
    /// the record field and the index score, as one atomic step.
    async fn record_view(&self, keys: ViewKeys<'_>) -> Result<ViewOutcome, StoreError>;
}
