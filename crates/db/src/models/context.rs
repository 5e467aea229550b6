use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A reusable context template. `content` is opaque at this layer: either a
/// serialized structured payload from the generator or free text from the
/// manual authoring path.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Context {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    #[ts(type = "string[]")]
    pub tags: sqlx::types::Json<Vec<String>>,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContext {
    pub name: String,
    pub content: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub created_by: Uuid,
}

impl Context {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Context>(
            r#"SELECT id, name, content, tags, description, created_by, created_at
               FROM contexts
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Resolve a set of client-declared ids server-side. Missing ids are
    /// silently skipped; input order is preserved.
    pub async fn find_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(context) = Self::find_by_id(pool, *id).await? {
                found.push(context);
            }
        }
        Ok(found)
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Context>(
            r#"SELECT id, name, content, tags, description, created_by, created_at
               FROM contexts
               ORDER BY created_at DESC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_creator(
        pool: &SqlitePool,
        created_by: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Context>(
            r#"SELECT id, name, content, tags, description, created_by, created_at
               FROM contexts
               WHERE created_by = $1
               ORDER BY created_at DESC"#,
        )
        .bind(created_by)
        .fetch_all(pool)
        .await
    }

    pub async fn find_starred_by(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Context>(
            r#"SELECT c.id, c.name, c.content, c.tags, c.description, c.created_by, c.created_at
               FROM contexts c
               JOIN context_stars s ON s.context_id = c.id
               WHERE s.user_id = $1
               ORDER BY c.created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateContext,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Context>(
            r#"INSERT INTO contexts (id, name, content, tags, description, created_by, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, name, content, tags, description, created_by, created_at"#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.content)
        .bind(sqlx::types::Json(data.tags.clone()))
        .bind(&data.description)
        .bind(data.created_by)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contexts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
