use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One ordered content block inside a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    File { url: String, name: String, media_type: String },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub content_type: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: MessageRole,
    #[ts(type = "Array<MessagePart>")]
    pub parts: sqlx::types::Json<Vec<MessagePart>>,
    #[ts(type = "Array<Attachment>")]
    pub attachments: sqlx::types::Json<Vec<Attachment>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessage {
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Concatenated text of all text parts, used for prompts and search.
    pub fn text_content(&self) -> String {
        self.parts
            .0
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::File { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateMessage,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"INSERT INTO messages (id, chat_id, role, parts, attachments, created_at)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, chat_id, role, parts, attachments, created_at"#,
        )
        .bind(id)
        .bind(data.chat_id)
        .bind(data.role)
        .bind(sqlx::types::Json(data.parts.clone()))
        .bind(sqlx::types::Json(data.attachments.clone()))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_chat_id(
        pool: &SqlitePool,
        chat_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"SELECT id, chat_id, role, parts, attachments, created_at
               FROM messages
               WHERE chat_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(chat_id)
        .fetch_all(pool)
        .await
    }

    /// Rolling count of a user's own messages since `since`, across all of
    /// their chats. Backs the daily quota check.
    pub async fn count_for_user_since(
        pool: &SqlitePool,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*)
               FROM messages m
               JOIN chats c ON m.chat_id = c.id
               WHERE c.user_id = $1 AND m.role = 'user' AND m.created_at > $2"#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
