//! Domain entities mirrored from persistent storage.

use time::OffsetDateTime;

/// Identifier of an article, tag, or link. Generated by [`crate::domain::ids::IdGenerator`].
pub type EntityId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub id: EntityId,
    pub title: String,
    pub description: String,
    pub content: String,
    pub view_count: i64,
    pub tag_id: EntityId,
    pub tag_name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub id: EntityId,
    pub name: String,
    pub url: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Minimal article row used to rebuild the global time and view rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticleStamp {
    pub id: EntityId,
    pub view_count: i64,
    pub created_at: OffsetDateTime,
}

/// Article membership row used to rebuild a per-tag ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagArticleStamp {
    pub id: EntityId,
    pub created_at: OffsetDateTime,
}

/// Derived tag attribute: number of articles currently owned by the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagArticleCount {
    pub name: String,
    pub count: i64,
}
