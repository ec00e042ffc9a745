use async_trait::async_trait;
use sqlx::{PgConnection, query, query_as, query_scalar};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        ArticleChange, ArticleSearchPage, ArticleUpdate, ArticlesRepo, NewArticle,
        ReclassifyOutcome, ReclassifyPlan, RepoError,
    },
    domain::entities::{ArticleRecord, ArticleStamp, EntityId, TagArticleStamp},
};

use super::{PostgresRepositories, map_sqlx_error, tags::find_or_create_tag, util::like_pattern};

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.description, a.content, a.view_count, \
    a.tag_id, t.name AS tag_name, a.created_at, a.updated_at";

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    description: String,
    content: String,
    view_count: i64,
    tag_id: i64,
    tag_name: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            content: row.content,
            view_count: row.view_count,
            tag_id: row.tag_id,
            tag_name: row.tag_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StampRow {
    id: i64,
    view_count: i64,
    created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct TagStampRow {
    id: i64,
    created_at: OffsetDateTime,
}

async fn fetch_article(
    conn: &mut PgConnection,
    id: EntityId,
) -> Result<Option<ArticleRecord>, RepoError> {
    let sql = format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles a INNER JOIN tags t ON t.id = a.tag_id WHERE a.id = $1"
    );
    let row = query_as::<_, ArticleRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(row.map(ArticleRecord::from))
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<ArticleRecord>, RepoError> {
        let mut conn = self.pool().acquire().await.map_err(map_sqlx_error)?;
        fetch_article(&mut conn, id).await
    }

    async fn find_by_ids(&self, ids: &[EntityId]) -> Result<Vec<ArticleRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a INNER JOIN tags t ON t.id = a.tag_id \
             WHERE a.id = ANY($1)"
        );
        let rows = query_as::<_, ArticleRow>(&sql)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ArticleRecord::from).collect())
    }

    async fn list_stamps(&self) -> Result<Vec<ArticleStamp>, RepoError> {
        let rows = query_as::<_, StampRow>("SELECT id, view_count, created_at FROM articles")
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|row| ArticleStamp {
                id: row.id,
                view_count: row.view_count,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn list_by_tag_name(&self, tag_name: &str) -> Result<Vec<TagArticleStamp>, RepoError> {
        let rows = query_as::<_, TagStampRow>(
            r#"
            SELECT a.id, a.created_at
            FROM articles a
            INNER JOIN tags t ON t.id = a.tag_id
            WHERE t.name = $1
            "#,
        )
        .bind(tag_name)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|row| TagArticleStamp {
                id: row.id,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn update_view_count(&self, id: EntityId, view_count: i64) -> Result<bool, RepoError> {
        let result = query("UPDATE articles SET view_count = $2 WHERE id = $1")
            .bind(id)
            .bind(view_count.max(0))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_by_title(
        &self,
        query_text: &str,
        limit: u32,
        offset: u32,
    ) -> Result<ArticleSearchPage, RepoError> {
        let pattern = like_pattern(query_text);
        let total: i64 = query_scalar("SELECT COUNT(*) FROM articles WHERE LOWER(title) LIKE $1")
            .bind(&pattern)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a INNER JOIN tags t ON t.id = a.tag_id \
             WHERE LOWER(a.title) LIKE $1 ORDER BY a.created_at DESC, a.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = query_as::<_, ArticleRow>(&sql)
            .bind(&pattern)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(ArticleSearchPage {
            records: rows.into_iter().map(ArticleRecord::from).collect(),
            total: total.max(0) as u64,
        })
    }

    async fn create_article(&self, article: NewArticle) -> Result<ArticleRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let (tag, _) =
            find_or_create_tag(&mut tx, &article.draft.tag_name, article.candidate_tag_id).await?;

        query(
            r#"
            INSERT INTO articles (id, title, description, content, view_count, tag_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $6)
            "#,
        )
        .bind(article.id)
        .bind(&article.draft.title)
        .bind(&article.draft.description)
        .bind(&article.draft.content)
        .bind(tag.id)
        .bind(article.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let record = fetch_article(&mut tx, article.id)
            .await?
            .ok_or(RepoError::NotFound)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(record)
    }

    async fn update_article(&self, update: ArticleUpdate) -> Result<ArticleChange, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let previous_tag_name: Option<String> = query_scalar(
            r#"
            SELECT t.name
            FROM articles a
            INNER JOIN tags t ON t.id = a.tag_id
            WHERE a.id = $1
            FOR UPDATE OF a
            "#,
        )
        .bind(update.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let previous_tag_name = previous_tag_name.ok_or(RepoError::NotFound)?;

        let (tag, _) =
            find_or_create_tag(&mut tx, &update.draft.tag_name, update.candidate_tag_id).await?;

        query(
            r#"
            UPDATE articles
            SET title = $2,
                description = $3,
                content = $4,
                tag_id = $5,
                updated_at = $6,
                view_count = COALESCE($7, view_count)
            WHERE id = $1
            "#,
        )
        .bind(update.id)
        .bind(&update.draft.title)
        .bind(&update.draft.description)
        .bind(&update.draft.content)
        .bind(tag.id)
        .bind(update.updated_at)
        .bind(update.view_count.map(|count| count.max(0)))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let record = fetch_article(&mut tx, update.id)
            .await?
            .ok_or(RepoError::NotFound)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ArticleChange {
            record,
            previous_tag_name,
        })
    }

    async fn delete_article(&self, id: EntityId) -> Result<Option<ArticleRecord>, RepoError> {
        let sql = format!(
            "DELETE FROM articles a USING tags t WHERE a.id = $1 AND t.id = a.tag_id \
             RETURNING {ARTICLE_COLUMNS}"
        );
        let row = query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ArticleRecord::from))
    }

    async fn reclassify(&self, plan: ReclassifyPlan) -> Result<ReclassifyOutcome, RepoError> {
        // Dropping `tx` on any early return rolls the whole move back.
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let previous_tag_names: Vec<String> = query_scalar(
            r#"
            SELECT DISTINCT t.name
            FROM articles a
            INNER JOIN tags t ON t.id = a.tag_id
            WHERE a.id = ANY($1)
            "#,
        )
        .bind(&plan.article_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let (tag, tag_created) =
            find_or_create_tag(&mut tx, &plan.tag_name, plan.candidate_tag_id).await?;

        let moved = query("UPDATE articles SET tag_id = $1 WHERE id = ANY($2)")
            .bind(tag.id)
            .bind(&plan.article_ids)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        if moved != plan.article_ids.len() as u64 {
            return Err(RepoError::NotFound);
        }

        if !plan.view_counts.is_empty() {
            let (ids, counts): (Vec<i64>, Vec<i64>) = plan
                .view_counts
                .iter()
                .map(|(id, count)| (*id, (*count).max(0)))
                .unzip();
            query(
                r#"
                UPDATE articles AS a
                SET view_count = v.view_count
                FROM UNNEST($1::BIGINT[], $2::BIGINT[]) AS v(id, view_count)
                WHERE a.id = v.id
                "#,
            )
            .bind(&ids)
            .bind(&counts)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ReclassifyOutcome {
            tag,
            tag_created,
            previous_tag_names,
        })
    }
}
