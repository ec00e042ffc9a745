use async_trait::async_trait;
use sqlx::{PgConnection, query_as};

use crate::{
    application::repos::{RepoError, TagsRepo},
    domain::entities::{EntityId, TagArticleCount, TagRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TagRow {
    id: i64,
    name: String,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagCountRow {
    name: String,
    article_count: i64,
}

/// Resolves `name` inside the caller's transaction, inserting it with
/// `candidate_id` when unseen. Returns the tag and whether it was created.
pub(super) async fn find_or_create_tag(
    conn: &mut PgConnection,
    name: &str,
    candidate_id: EntityId,
) -> Result<(TagRecord, bool), RepoError> {
    let inserted = query_as::<_, TagRow>(
        r#"
        INSERT INTO tags (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO NOTHING
        RETURNING id, name
        "#,
    )
    .bind(candidate_id)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    if let Some(row) = inserted {
        return Ok((row.into(), true));
    }

    let existing = query_as::<_, TagRow>("SELECT id, name FROM tags WHERE name = $1")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok((existing.into(), false))
}

#[async_trait]
impl TagsRepo for PostgresRepositories {
    async fn find_or_create(
        &self,
        name: &str,
        candidate_id: EntityId,
    ) -> Result<(TagRecord, bool), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let resolved = find_or_create_tag(&mut tx, name, candidate_id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(resolved)
    }

    async fn article_counts(&self) -> Result<Vec<TagArticleCount>, RepoError> {
        let rows = query_as::<_, TagCountRow>(
            r#"
            SELECT t.name, COUNT(a.id) AS article_count
            FROM tags t
            INNER JOIN articles a ON a.tag_id = t.id
            GROUP BY t.name
            HAVING COUNT(a.id) > 0
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| TagArticleCount {
                name: row.name,
                count: row.article_count,
            })
            .collect())
    }
}
