use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Guest,
    Regular,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, user_type, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Idempotent upsert, invoked at session establishment so later writes
    /// always have a user row to reference.
    pub async fn ensure(
        pool: &SqlitePool,
        id: Uuid,
        email: &str,
        user_type: UserType,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, email, user_type, created_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT(id) DO UPDATE SET email = excluded.email
               RETURNING id, email, user_type, created_at"#,
        )
        .bind(id)
        .bind(email)
        .bind(user_type)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }
}
