//! Single route for dropping derived entries after a mutation.

use tracing::debug;

use crate::domain::entities::EntityId;

use super::keys::{IndexKey, RecordKey, RecordKind};
use super::store::{FastStore, StoreError};

/// Record entries and whole ranking sets to drop together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    records: Vec<RecordKey>,
    indexes: Vec<IndexKey>,
}

impl Invalidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, kind: RecordKind, id: EntityId) -> Self {
        let key = RecordKey::new(kind, id);
        if !self.records.contains(&key) {
            self.records.push(key);
        }
        self
    }

    pub fn records(self, kind: RecordKind, ids: impl IntoIterator<Item = EntityId>) -> Self {
        ids.into_iter().fold(self, |acc, id| acc.record(kind, id))
    }

    pub fn index(mut self, key: IndexKey) -> Self {
        if !self.indexes.contains(&key) {
            self.indexes.push(key);
        }
        self
    }

    pub fn tag_articles<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(self, |acc, name| acc.index(IndexKey::tag_articles(name)))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.indexes.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.records
            .iter()
            .map(ToString::to_string)
            .chain(self.indexes.iter().map(ToString::to_string))
            .collect()
    }

    /// Deletes every collected key in one store call.
    pub async fn apply(self, store: &dyn FastStore) -> Result<u64, StoreError> {
        if self.is_empty() {
            return Ok(0);
        }
        let keys = self.keys();
        let removed = store.delete(&keys).await?;
        debug!(
            target = "metablog::cache::invalidation",
            keys = ?keys,
            removed,
            "Invalidated cache entries"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_collapsed() {
        let plan = Invalidation::new()
            .records(RecordKind::Article, [1, 2, 1])
            .tag_articles(["rust", "rust", "go"])
            .index(IndexKey::TagArticleCounts);
        assert_eq!(
            plan.keys(),
            [
                "article:1:Hash",
                "article:2:Hash",
                "rust:article:ZSet",
                "go:article:ZSet",
                "tag:articleNum:ZSet",
            ]
        );
    }
}
