use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// One row per chat turn; lets a reconnecting client locate the stream it was
/// reading. Inert beyond that.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct StreamId {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl StreamId {
    pub async fn create(pool: &SqlitePool, chat_id: Uuid, id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, StreamId>(
            r#"INSERT INTO stream_ids (id, chat_id, created_at)
               VALUES ($1, $2, $3)
               RETURNING id, chat_id, created_at"#,
        )
        .bind(id)
        .bind(chat_id)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_latest_for_chat(
        pool: &SqlitePool,
        chat_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, StreamId>(
            r#"SELECT id, chat_id, created_at
               FROM stream_ids
               WHERE chat_id = $1
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(chat_id)
        .fetch_optional(pool)
        .await
    }
}
