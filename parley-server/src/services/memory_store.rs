//! In-process implementation of the chat storage traits.
//!
//! Backs the router and realtime test suites, which run without Postgres. All
//! state sits behind one async mutex, so find-or-create is atomic in the same
//! way the Postgres transaction plus unique pair key makes it atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use shared::models::{Conversation, Message, PairKey, UserSummary};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::chat_store::{
    ChatStoreResult, ConversationStore, MessageStore, SessionStore, UserDirectory, pair_key,
};
use crate::auth::session::hash_session_token;

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, UserSummary>,
    conversations: HashMap<PairKey, Conversation>,
    messages: HashMap<Uuid, Vec<Message>>,
    sessions: HashMap<Vec<u8>, Uuid>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Strictly increasing clock so creation order and timestamp order agree.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }
}

#[derive(Debug, Default)]
pub struct MemoryChatStore {
    state: Mutex<MemoryState>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserSummary) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Registers a session token the way the identity service would.
    pub async fn insert_session(&self, token: &str, user_id: Uuid) {
        self.state
            .lock()
            .await
            .sessions
            .insert(hash_session_token(token), user_id);
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryChatStore {
    async fn find_between(&self, a: Uuid, b: Uuid) -> ChatStoreResult<Option<Conversation>> {
        let key = pair_key(a, b)?;
        Ok(self.state.lock().await.conversations.get(&key).cloned())
    }

    async fn resolve(&self, sender: Uuid, receiver: Uuid) -> ChatStoreResult<Conversation> {
        let key = pair_key(sender, receiver)?;
        let mut state = self.state.lock().await;

        if let Some(existing) = state.conversations.get(&key) {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: key,
            created_at: state.next_timestamp().into(),
        };
        state.conversations.insert(key, conversation.clone());
        Ok(conversation)
    }
}

#[async_trait]
impl MessageStore for MemoryChatStore {
    async fn append(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> ChatStoreResult<Message> {
        let mut state = self.state.lock().await;
        let created_at = state.next_timestamp().into();

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body: body.to_string(),
            created_at,
            updated_at: created_at,
        };

        state
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_ordered(&self, conversation_id: Uuid) -> ChatStoreResult<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl UserDirectory for MemoryChatStore {
    async fn list_others(&self, user_id: Uuid) -> ChatStoreResult<Vec<UserSummary>> {
        let state = self.state.lock().await;
        let mut users: Vec<UserSummary> = state
            .users
            .values()
            .filter(|user| user.id != user_id)
            .cloned()
            .collect();
        users.sort_by(|a, b| {
            a.full_name
                .cmp(&b.full_name)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(users)
    }
}

#[async_trait]
impl SessionStore for MemoryChatStore {
    async fn user_for_token(&self, token: &str) -> ChatStoreResult<Option<Uuid>> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(&hash_session_token(token)).copied())
    }
}
