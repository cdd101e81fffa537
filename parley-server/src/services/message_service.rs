use async_trait::async_trait;
use shared::models::Message;
use tracing::instrument;
use uuid::Uuid;

use super::{
    chat_store::{ChatStoreResult, MessageStore},
    pg_store::{MessageRow, PgChatStore},
};

#[async_trait]
impl MessageStore for PgChatStore {
    #[instrument(name = "messages.append", skip(self, body), fields(body_len = body.len()), err)]
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> ChatStoreResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            r"
            INSERT INTO messages (id, conversation_id, sender_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, sender_id, body, created_at, updated_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(self.pool())
        .await?;

        Ok(row.into())
    }

    #[instrument(name = "messages.list_ordered", skip(self), err)]
    async fn list_ordered(&self, conversation_id: Uuid) -> ChatStoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r"
            SELECT id, conversation_id, sender_id, body, created_at, updated_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, seq ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }
}
