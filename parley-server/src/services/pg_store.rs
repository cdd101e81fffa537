use std::fmt;

use chrono::{DateTime, Utc};
use shared::models::{Conversation, Message, UserSummary};
use sqlx::PgPool;
use uuid::Uuid;

use super::chat_store::{ChatStoreError, pair_key};

/// Postgres-backed implementation of the chat storage traits.
///
/// The trait impls live next to their concern in `conversation_service`,
/// `message_service` and `user_service`.
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl fmt::Debug for PgChatStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgChatStore").finish_non_exhaustive()
    }
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ConversationRow {
    pub id: Uuid,
    pub pair_low: Uuid,
    pub pair_high: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = ChatStoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: row.id,
            participants: pair_key(row.pair_low, row.pair_high)?,
            created_at: row.created_at.into(),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            body: row.body,
            created_at: row.created_at.into(),
            updated_at: row.updated_at.into(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub profile_pic: String,
}

impl From<UserRow> for UserSummary {
    fn from(row: UserRow) -> Self {
        UserSummary {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            profile_pic: row.profile_pic,
        }
    }
}
