//! Substring search over a user's chats, ranked by most recent activity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use utils::text::escape_like_pattern;
use uuid::Uuid;

pub const DEFAULT_SEARCH_LIMIT: i64 = 25;
pub const MAX_SEARCH_LIMIT: i64 = 100;

#[derive(Debug, Clone, FromRow, Serialize, TS)]
pub struct ChatSearchResult {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Case-insensitive substring match over chat titles and message content,
/// scoped to `user_id`, most recent activity first.
///
/// An empty or whitespace query returns nothing; "no search" must not mean
/// "the user's entire history".
pub async fn search_chats(
    pool: &SqlitePool,
    user_id: Uuid,
    query: &str,
    limit: Option<i64>,
) -> Result<Vec<ChatSearchResult>, sqlx::Error> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
    let pattern = format!("%{}%", escape_like_pattern(query.trim()));

    // Message content is matched per text part, not against the raw JSON
    // serialization, so structural keys and JSON escaping never leak into
    // search results.
    sqlx::query_as::<_, ChatSearchResult>(
        r#"SELECT c.id, c.title, c.created_at, MAX(m.created_at) AS last_message_at
           FROM chats c
           LEFT JOIN messages m ON m.chat_id = c.id
           WHERE c.user_id = $1
             AND (c.title LIKE $2 ESCAPE '\'
                  OR EXISTS (SELECT 1 FROM messages mm, json_each(mm.parts) p
                             WHERE mm.chat_id = c.id
                               AND json_extract(p.value, '$.type') = 'text'
                               AND json_extract(p.value, '$.text') LIKE $2 ESCAPE '\'))
           GROUP BY c.id, c.title, c.created_at
           ORDER BY COALESCE(MAX(m.created_at), c.created_at) DESC
           LIMIT $3"#,
    )
    .bind(user_id)
    .bind(pattern)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::DBService;
    use db::models::chat::{Chat, ChatVisibility, CreateChat};
    use db::models::message::{CreateMessage, Message, MessagePart, MessageRole};
    use db::models::user::{User, UserType};

    async fn seed_chat(pool: &SqlitePool, user_id: Uuid, title: &str, body: &str) -> Uuid {
        let chat = Chat::create(
            pool,
            &CreateChat {
                user_id,
                title: title.to_string(),
                visibility: ChatVisibility::Private,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        Message::create(
            pool,
            &CreateMessage {
                chat_id: chat.id,
                role: MessageRole::User,
                parts: vec![MessagePart::text(body)],
                attachments: Vec::new(),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        chat.id
    }

    async fn setup() -> (DBService, Uuid) {
        let db = DBService::new_in_memory().await.unwrap();
        let user_id = Uuid::new_v4();
        User::ensure(&db.pool, user_id, "a@example.com", UserType::Regular)
            .await
            .unwrap();
        (db, user_id)
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let (db, user_id) = setup().await;
        seed_chat(&db.pool, user_id, "Rust help", "how do lifetimes work").await;

        assert!(search_chats(&db.pool, user_id, "", None).await.unwrap().is_empty());
        assert!(search_chats(&db.pool, user_id, "   ", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn matches_title_and_message_content() {
        let (db, user_id) = setup().await;
        let by_title = seed_chat(&db.pool, user_id, "Rust help", "nothing here").await;
        let by_body = seed_chat(&db.pool, user_id, "misc", "tell me about rust traits").await;
        seed_chat(&db.pool, user_id, "cooking", "pasta recipe").await;

        let results = search_chats(&db.pool, user_id, "RUST", None).await.unwrap();
        let ids: Vec<Uuid> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&by_title));
        assert!(ids.contains(&by_body));
    }

    #[tokio::test]
    async fn scoped_to_the_requesting_user() {
        let (db, user_id) = setup().await;
        let other = Uuid::new_v4();
        User::ensure(&db.pool, other, "b@example.com", UserType::Regular)
            .await
            .unwrap();
        seed_chat(&db.pool, other, "Rust secrets", "rust rust rust").await;

        assert!(
            search_chats(&db.pool, user_id, "rust", None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn json_structure_is_not_searchable() {
        let (db, user_id) = setup().await;
        seed_chat(&db.pool, user_id, "cooking", "pasta recipe").await;

        // Keys of the stored part objects must not match.
        for query in ["type", "text", "url", "name"] {
            let results = search_chats(&db.pool, user_id, query, None).await.unwrap();
            assert!(results.is_empty(), "query {query:?} matched JSON structure");
        }
    }

    #[tokio::test]
    async fn quotes_and_backslashes_match_their_text() {
        let (db, user_id) = setup().await;
        seed_chat(&db.pool, user_id, "notes", r#"she said "hi" and C:\tmp"#).await;

        let results = search_chats(&db.pool, user_id, r#"said "hi""#, None).await.unwrap();
        assert_eq!(results.len(), 1);

        let results = search_chats(&db.pool, user_id, r"C:\tmp", None).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn like_wildcards_are_literal() {
        let (db, user_id) = setup().await;
        seed_chat(&db.pool, user_id, "discount 50% off", "sale").await;
        seed_chat(&db.pool, user_id, "discount 50x off", "sale").await;

        let results = search_chats(&db.pool, user_id, "50%", None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "discount 50% off");
    }

    #[tokio::test]
    async fn respects_limit() {
        let (db, user_id) = setup().await;
        for i in 0..5 {
            seed_chat(&db.pool, user_id, &format!("topic {i}"), "body").await;
        }

        let results = search_chats(&db.pool, user_id, "topic", Some(2)).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
