use async_trait::async_trait;
use shared::models::Conversation;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    chat_store::{ChatStoreResult, ConversationStore, pair_key},
    pg_store::{ConversationRow, PgChatStore},
};

const FIND_BETWEEN_SQL: &str = r"
SELECT c.id, c.pair_low, c.pair_high, c.created_at
FROM conversations c
JOIN conversation_participants p ON p.conversation_id = c.id
WHERE c.id IN (
    SELECT conversation_id FROM conversation_participants WHERE user_id = $1
)
GROUP BY c.id, c.pair_low, c.pair_high, c.created_at
HAVING COUNT(*) = 2 AND COUNT(*) FILTER (WHERE p.user_id = $2) = 1
LIMIT 1
";

const INSERT_CONVERSATION_SQL: &str = r"
INSERT INTO conversations (id, pair_low, pair_high)
VALUES ($1, $2, $3)
ON CONFLICT (pair_low, pair_high) DO NOTHING
RETURNING id, pair_low, pair_high, created_at
";

const INSERT_PARTICIPANTS_SQL: &str = r"
INSERT INTO conversation_participants (conversation_id, user_id)
VALUES ($1, $2), ($1, $3)
";

const SELECT_BY_PAIR_SQL: &str = r"
SELECT id, pair_low, pair_high, created_at
FROM conversations
WHERE pair_low = $1 AND pair_high = $2
";

#[async_trait]
impl ConversationStore for PgChatStore {
    #[instrument(name = "conversations.find_between", skip(self), err)]
    async fn find_between(&self, a: Uuid, b: Uuid) -> ChatStoreResult<Option<Conversation>> {
        pair_key(a, b)?;

        let row = sqlx::query_as::<_, ConversationRow>(FIND_BETWEEN_SQL)
            .bind(a)
            .bind(b)
            .fetch_optional(self.pool())
            .await?;

        row.map(Conversation::try_from).transpose()
    }

    /// Lookup first; on a miss the insert and both memberships commit together.
    /// The unique pair key turns a concurrent creator's insert into a no-op,
    /// after which it reads the winner's row in the same transaction.
    #[instrument(name = "conversations.resolve", skip(self), err)]
    async fn resolve(&self, sender: Uuid, receiver: Uuid) -> ChatStoreResult<Conversation> {
        if let Some(existing) = self.find_between(sender, receiver).await? {
            return Ok(existing);
        }

        let pair = pair_key(sender, receiver)?;
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query_as::<_, ConversationRow>(INSERT_CONVERSATION_SQL)
            .bind(Uuid::new_v4())
            .bind(pair.low())
            .bind(pair.high())
            .fetch_optional(&mut *tx)
            .await?;

        let row = if let Some(row) = inserted {
            sqlx::query(INSERT_PARTICIPANTS_SQL)
                .bind(row.id)
                .bind(pair.low())
                .bind(pair.high())
                .execute(&mut *tx)
                .await?;
            debug!(conversation_id = %row.id, "created conversation");
            row
        } else {
            debug!("conversation created concurrently, reading existing row");
            sqlx::query_as::<_, ConversationRow>(SELECT_BY_PAIR_SQL)
                .bind(pair.low())
                .bind(pair.high())
                .fetch_one(&mut *tx)
                .await?
        };

        tx.commit().await?;
        Conversation::try_from(row)
    }
}
