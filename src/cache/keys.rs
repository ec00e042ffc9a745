//! Fast-store key definitions.
//!
//! Every key the engine reads or writes is built here, so the key layout of a
//! deployed store stays stable across modules.

use std::fmt;

use crate::domain::entities::EntityId;

/// Entity families that own a record-cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Article,
    Link,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one record-cache entry: `{kind}:{id}:Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub id: EntityId,
}

impl RecordKey {
    pub fn new(kind: RecordKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    pub fn article(id: EntityId) -> Self {
        Self::new(RecordKind::Article, id)
    }

    pub fn link(id: EntityId) -> Self {
        Self::new(RecordKind::Link, id)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:Hash", self.kind, self.id)
    }
}

/// Named ordered sets maintained by the ranking index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// All articles, scored by creation time (unix ms).
    ArticlesByTime,
    /// All articles, scored by view count.
    ArticlesByView,
    /// Articles owned by one tag, scored by creation time.
    TagArticles(String),
    /// Tag names, scored by the number of articles they own.
    TagArticleCounts,
    /// Links, scored by last update time (unix ms).
    Links,
}

impl IndexKey {
    pub fn tag_articles(name: impl Into<String>) -> Self {
        Self::TagArticles(name.into())
    }

    /// Metric label for the key family.
    pub fn family(&self) -> &'static str {
        match self {
            Self::ArticlesByTime => "articles_by_time",
            Self::ArticlesByView => "articles_by_view",
            Self::TagArticles(_) => "tag_articles",
            Self::TagArticleCounts => "tag_article_counts",
            Self::Links => "links",
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArticlesByTime => f.write_str("article:time:ZSet"),
            Self::ArticlesByView => f.write_str("article:view:ZSet"),
            Self::TagArticles(name) => write!(f, "{name}:article:ZSet"),
            Self::TagArticleCounts => f.write_str("tag:articleNum:ZSet"),
            Self::Links => f.write_str("link:ZSet"),
        }
    }
}

/// Key of the dedup marker for one viewer of one article.
///
/// Markers share the keyspace with the per-tag sets. Callers pass viewer ids
/// without `:`; a viewer id such as `article:ZSet` would land on the set of a
/// tag named after the article id.
pub fn view_marker_key(article_id: EntityId, viewer_id: &str) -> String {
    format!("{article_id}:{viewer_id}")
}

/// Ordered-set member for an entity id.
pub fn member(id: EntityId) -> String {
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(RecordKey::article(42).to_string(), "article:42:Hash");
        assert_eq!(RecordKey::link(7).to_string(), "link:7:Hash");
        assert_eq!(IndexKey::ArticlesByTime.to_string(), "article:time:ZSet");
        assert_eq!(IndexKey::ArticlesByView.to_string(), "article:view:ZSet");
        assert_eq!(
            IndexKey::tag_articles("rust").to_string(),
            "rust:article:ZSet"
        );
        assert_eq!(
            IndexKey::TagArticleCounts.to_string(),
            "tag:articleNum:ZSet"
        );
        assert_eq!(IndexKey::Links.to_string(), "link:ZSet");
        assert_eq!(view_marker_key(1, "v1"), "1:v1");
    }

    #[test]
    fn plain_viewer_ids_never_hit_a_tag_set() {
        let marker = view_marker_key(7, "203.0.113.9");
        assert_ne!(marker, IndexKey::tag_articles("7").to_string());
        assert!(!marker.ends_with(":article:ZSet"));

        // colon-bearing viewer ids are the caller's to reject
        assert_eq!(
            view_marker_key(7, "article:ZSet"),
            IndexKey::tag_articles("7").to_string()
        );
    }
}
