//! Storage seams for the messaging core.
//!
//! The resolver, message store and directory are expressed as traits so the
//! services can run against Postgres in production and against
//! [`MemoryChatStore`](super::memory_store::MemoryChatStore) in tests. Both
//! implementations uphold the same invariants: at most one conversation per
//! unordered pair, and messages listed in creation order with insertion order
//! breaking ties.

use async_trait::async_trait;
use shared::models::{Conversation, Message, PairKey, UserSummary};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid participant pair: {0}")]
    InvalidPair(String),
}

pub type ChatStoreResult<T> = Result<T, ChatStoreError>;

pub(crate) fn pair_key(a: Uuid, b: Uuid) -> ChatStoreResult<PairKey> {
    PairKey::new(a, b).ok_or_else(|| {
        ChatStoreError::InvalidPair(format!("a conversation needs two distinct users, got {a} twice"))
    })
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the two-party conversation shared by `a` and `b`, if any.
    async fn find_between(&self, a: Uuid, b: Uuid) -> ChatStoreResult<Option<Conversation>>;

    /// Returns the conversation for the pair, creating it on first contact.
    ///
    /// `resolve(a, b)` and `resolve(b, a)` yield the same conversation, and
    /// concurrent first-contact calls converge on a single row.
    async fn resolve(&self, sender: Uuid, receiver: Uuid) -> ChatStoreResult<Conversation>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> ChatStoreResult<Message>;

    /// Messages ascending by creation time. Unknown conversations yield an empty list.
    async fn list_ordered(&self, conversation_id: Uuid) -> ChatStoreResult<Vec<Message>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Every known user except `user_id`, ordered by full name.
    async fn list_others(&self, user_id: Uuid) -> ChatStoreResult<Vec<UserSummary>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolves an opaque session token to the user it was issued for.
    async fn user_for_token(&self, token: &str) -> ChatStoreResult<Option<Uuid>>;
}

/// Everything the HTTP layer needs from storage.
pub trait ChatStore: ConversationStore + MessageStore + UserDirectory + SessionStore {}

impl<T> ChatStore for T where T: ConversationStore + MessageStore + UserDirectory + SessionStore {}
