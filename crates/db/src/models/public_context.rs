use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A context's listing in the shared cross-user library. At most one live row
/// per context (UNIQUE on `context_id`); deleting the context cascades here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PublicContext {
    pub id: Uuid,
    pub context_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PublicContext {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PublicContext>(
            "SELECT id, context_id, created_by, created_at FROM public_contexts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_context_id(
        pool: &SqlitePool,
        context_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PublicContext>(
            r#"SELECT id, context_id, created_by, created_at
               FROM public_contexts
               WHERE context_id = $1"#,
        )
        .bind(context_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PublicContext>(
            r#"SELECT id, context_id, created_by, created_at
               FROM public_contexts
               ORDER BY created_at DESC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        context_id: Uuid,
        created_by: Uuid,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PublicContext>(
            r#"INSERT INTO public_contexts (id, context_id, created_by, created_at)
               VALUES ($1, $2, $3, $4)
               RETURNING id, context_id, created_by, created_at"#,
        )
        .bind(id)
        .bind(context_id)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM public_contexts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
