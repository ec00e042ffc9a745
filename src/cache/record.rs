//! Record cache: one field map per article or link, populated on read miss.
//!
//! Entries are never updated in place by write paths. A mutation deletes the
//! entry through [`super::invalidation::Invalidation`] and the next read
//! repopulates it from the persistent store.

use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use tracing::{debug, warn};

use crate::domain::entities::{ArticleRecord, EntityId, LinkRecord};

use super::error::EngineError;
use super::keys::{RecordKey, RecordKind};
use super::store::{FastStore, FieldMap, StoreError};

const METRIC_RECORD_HIT: &str = "metablog_record_cache_hit_total";
const METRIC_RECORD_MISS: &str = "metablog_record_cache_miss_total";

/// Second-precision display form stored next to the full-precision stamps.
pub const DISPLAY_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Field holding the article view count; incremented by view accounting.
pub const VIEW_COUNT_FIELD: &str = "view_count";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("cached {kind} {id} is missing field `{field}`")]
    MissingField {
        kind: RecordKind,
        id: EntityId,
        field: &'static str,
    },
    #[error("cached {kind} {id} has malformed field `{field}`: {raw:?}")]
    Malformed {
        kind: RecordKind,
        id: EntityId,
        field: &'static str,
        raw: String,
    },
}

/// A value that can live in the record cache as a flat field map.
pub trait CachedRecord: Sized + Send + Sync {
    const KIND: RecordKind;

    fn id(&self) -> EntityId;

    fn to_fields(&self) -> Vec<(String, String)>;

    fn from_fields(id: EntityId, fields: &FieldMap) -> Result<Self, DecodeError>;
}

struct FieldReader<'a> {
    kind: RecordKind,
    id: EntityId,
    fields: &'a FieldMap,
}

impl<'a> FieldReader<'a> {
    fn new<R: CachedRecord>(id: EntityId, fields: &'a FieldMap) -> Self {
        Self {
            kind: R::KIND,
            id,
            fields,
        }
    }

    fn text(&self, field: &'static str) -> Result<String, DecodeError> {
        self.fields
            .get(field)
            .cloned()
            .ok_or(DecodeError::MissingField {
                kind: self.kind,
                id: self.id,
                field,
            })
    }

    fn int(&self, field: &'static str) -> Result<i64, DecodeError> {
        let raw = self.text(field)?;
        raw.parse().map_err(|_| DecodeError::Malformed {
            kind: self.kind,
            id: self.id,
            field,
            raw,
        })
    }

    fn timestamp_ms(&self, field: &'static str) -> Result<OffsetDateTime, DecodeError> {
        let millis = self.int(field)?;
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).map_err(|_| {
            DecodeError::Malformed {
                kind: self.kind,
                id: self.id,
                field,
                raw: millis.to_string(),
            }
        })
    }
}

/// Unix milliseconds, the score unit of every time-ordered set.
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Renders `at` in the second-precision display form.
pub fn display_timestamp(at: OffsetDateTime) -> String {
    at.format(DISPLAY_TIMESTAMP)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

impl CachedRecord for ArticleRecord {
    const KIND: RecordKind = RecordKind::Article;

    fn id(&self) -> EntityId {
        self.id
    }

    fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("title".into(), self.title.clone()),
            ("description".into(), self.description.clone()),
            ("content".into(), self.content.clone()),
            (VIEW_COUNT_FIELD.into(), self.view_count.to_string()),
            ("tag_id".into(), self.tag_id.to_string()),
            ("tag_name".into(), self.tag_name.clone()),
            ("created".into(), display_timestamp(self.created_at)),
            ("updated".into(), display_timestamp(self.updated_at)),
            ("created_at_ms".into(), unix_millis(self.created_at).to_string()),
            ("updated_at_ms".into(), unix_millis(self.updated_at).to_string()),
        ]
    }

    fn from_fields(id: EntityId, fields: &FieldMap) -> Result<Self, DecodeError> {
        let reader = FieldReader::new::<Self>(id, fields);
        Ok(Self {
            id,
            title: reader.text("title")?,
            description: reader.text("description")?,
            content: reader.text("content")?,
            view_count: reader.int(VIEW_COUNT_FIELD)?,
            tag_id: reader.int("tag_id")?,
            tag_name: reader.text("tag_name")?,
            created_at: reader.timestamp_ms("created_at_ms")?,
            updated_at: reader.timestamp_ms("updated_at_ms")?,
        })
    }
}

impl CachedRecord for LinkRecord {
    const KIND: RecordKind = RecordKind::Link;

    fn id(&self) -> EntityId {
        self.id
    }

    fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("name".into(), self.name.clone()),
            ("url".into(), self.url.clone()),
            ("created".into(), display_timestamp(self.created_at)),
            ("updated".into(), display_timestamp(self.updated_at)),
            ("created_at_ms".into(), unix_millis(self.created_at).to_string()),
            ("updated_at_ms".into(), unix_millis(self.updated_at).to_string()),
        ]
    }

    fn from_fields(id: EntityId, fields: &FieldMap) -> Result<Self, DecodeError> {
        let reader = FieldReader::new::<Self>(id, fields);
        Ok(Self {
            id,
            name: reader.text("name")?,
            url: reader.text("url")?,
            created_at: reader.timestamp_ms("created_at_ms")?,
            updated_at: reader.timestamp_ms("updated_at_ms")?,
        })
    }
}

/// Cache-aside access to record entries of any [`CachedRecord`] kind.
#[derive(Clone)]
pub struct RecordCache {
    store: Arc<dyn FastStore>,
}

impl RecordCache {
    pub fn new(store: Arc<dyn FastStore>) -> Self {
        Self { store }
    }

    /// Reads and decodes the entry for `id`. A missing key is a miss; any
    /// other store failure propagates.
    pub async fn get<R: CachedRecord>(&self, id: EntityId) -> Result<Option<R>, EngineError> {
        let key = RecordKey::new(R::KIND, id).to_string();
        match self.store.hash_get_all(&key).await? {
            Some(fields) if !fields.is_empty() => Ok(Some(R::from_fields(id, &fields)?)),
            _ => Ok(None),
        }
    }

    pub async fn put<R: CachedRecord>(&self, record: &R) -> Result<(), StoreError> {
        let key = RecordKey::new(R::KIND, record.id()).to_string();
        self.store.hash_set_all(&key, record.to_fields()).await
    }

    /// Returns the cached record or loads it with `load` and caches it.
    ///
    /// A failed cache write after a successful load is logged and the loaded
    /// record is still returned.
    pub async fn get_or_load<R, F, Fut>(&self, id: EntityId, load: F) -> Result<R, EngineError>
    where
        R: CachedRecord,
        F: FnOnce(EntityId) -> Fut,
        Fut: Future<Output = Result<Option<R>, EngineError>>,
    {
        if let Some(record) = self.get::<R>(id).await? {
            counter!(METRIC_RECORD_HIT, "kind" => R::KIND.as_str()).increment(1);
            return Ok(record);
        }
        counter!(METRIC_RECORD_MISS, "kind" => R::KIND.as_str()).increment(1);

        let record = load(id)
            .await?
            .ok_or_else(|| EngineError::not_found(R::KIND.as_str(), id))?;
        match self.put(&record).await {
            Ok(()) => debug!(
                target = "metablog::cache::record",
                kind = %R::KIND,
                id,
                "Repaired record cache entry"
            ),
            Err(err) => warn!(
                target = "metablog::cache::record",
                kind = %R::KIND,
                id,
                error = %err,
                "Failed to repopulate record cache entry"
            ),
        }
        Ok(record)
    }
}
