use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatVisibility {
    Private,
    Public,
}

impl Default for ChatVisibility {
    fn default() -> Self {
        ChatVisibility::Private
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub visibility: ChatVisibility,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateChat {
    pub user_id: Uuid,
    pub title: String,
    pub visibility: ChatVisibility,
}

impl Chat {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Chat>(
            "SELECT id, user_id, title, visibility, created_at FROM chats WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateChat,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Chat>(
            r#"INSERT INTO chats (id, user_id, title, visibility, created_at)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, user_id, title, visibility, created_at"#,
        )
        .bind(id)
        .bind(data.user_id)
        .bind(&data.title)
        .bind(data.visibility)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Messages, stream ids and context links cascade at the storage layer.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
