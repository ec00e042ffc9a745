use async_trait::async_trait;
use sqlx::query_as;
use time::OffsetDateTime;

use crate::{
    application::repos::{LinksRepo, NewLink, RepoError},
    domain::{
        articles::LinkDraft,
        entities::{EntityId, LinkRecord},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: i64,
    name: String,
    url: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<LinkRow> for LinkRecord {
    fn from(row: LinkRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            url: row.url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl LinksRepo for PostgresRepositories {
    async fn list_all(&self) -> Result<Vec<LinkRecord>, RepoError> {
        let rows = query_as::<_, LinkRow>(
            "SELECT id, name, url, created_at, updated_at FROM links ORDER BY updated_at DESC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(LinkRecord::from).collect())
    }

    async fn find_by_id(&self, id: EntityId) -> Result<Option<LinkRecord>, RepoError> {
        let row = query_as::<_, LinkRow>(
            "SELECT id, name, url, created_at, updated_at FROM links WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(LinkRecord::from))
    }

    async fn create_link(&self, link: NewLink) -> Result<LinkRecord, RepoError> {
        let row = query_as::<_, LinkRow>(
            r#"
            INSERT INTO links (id, name, url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, name, url, created_at, updated_at
            "#,
        )
        .bind(link.id)
        .bind(&link.draft.name)
        .bind(&link.draft.url)
        .bind(link.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_link(
        &self,
        id: EntityId,
        draft: LinkDraft,
        updated_at: OffsetDateTime,
    ) -> Result<Option<LinkRecord>, RepoError> {
        let row = query_as::<_, LinkRow>(
            r#"
            UPDATE links
            SET name = $2, url = $3, updated_at = $4
            WHERE id = $1
            RETURNING id, name, url, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.url)
        .bind(updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(LinkRecord::from))
    }

    async fn delete_link(&self, id: EntityId) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
