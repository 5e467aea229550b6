use sqlx::SqlitePool;
use uuid::Uuid;

/// Write-only audit trail of contexts attached to a chat. Nothing reads it
/// back today; a failed insert never fails the turn.
pub struct ChatContext;

impl ChatContext {
    pub async fn link(
        pool: &SqlitePool,
        chat_id: Uuid,
        context_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        for context_id in context_ids {
            sqlx::query(
                r#"INSERT INTO chat_contexts (chat_id, context_id, created_at)
                   VALUES ($1, $2, $3)
                   ON CONFLICT(chat_id, context_id) DO NOTHING"#,
            )
            .bind(chat_id)
            .bind(context_id)
            .bind(chrono::Utc::now())
            .execute(pool)
            .await?;
        }
        Ok(())
    }
}
