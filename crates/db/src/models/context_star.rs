use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// One star per (user, context) pair, enforced by the composite primary key.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ContextStar {
    pub user_id: Uuid,
    pub context_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ContextStar {
    /// Insert a star; returns false when the pair was already starred.
    pub async fn star(
        pool: &SqlitePool,
        user_id: Uuid,
        context_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"INSERT INTO context_stars (user_id, context_id, created_at)
               VALUES ($1, $2, $3)
               ON CONFLICT(user_id, context_id) DO NOTHING"#,
        )
        .bind(user_id)
        .bind(context_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unstar(
        pool: &SqlitePool,
        user_id: Uuid,
        context_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM context_stars WHERE user_id = $1 AND context_id = $2")
                .bind(user_id)
                .bind(context_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn exists(
        pool: &SqlitePool,
        user_id: Uuid,
        context_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM context_stars WHERE user_id = $1 AND context_id = $2",
        )
        .bind(user_id)
        .bind(context_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn context_ids_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT context_id FROM context_stars WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
