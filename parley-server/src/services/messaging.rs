use std::{fmt, sync::Arc};

use metrics::counter;
use shared::models::{Message, MessageView};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    chat_store::{ChatStore, ChatStoreError, ConversationStore, MessageStore},
    dispatcher::DeliveryDispatcher,
};

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] ChatStoreError),
}

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Send and history operations for two-party conversations.
#[derive(Clone)]
pub struct MessagingService {
    store: Arc<dyn ChatStore>,
    dispatcher: Arc<DeliveryDispatcher>,
}

impl fmt::Debug for MessagingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingService").finish_non_exhaustive()
    }
}

impl MessagingService {
    pub fn new(store: Arc<dyn ChatStore>, dispatcher: Arc<DeliveryDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Resolves the pair's conversation, persists the message and pushes it
    /// to the receiver if connected. Delivery failures never fail the send.
    #[instrument(name = "messaging.send", skip(self, body), err)]
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: &str,
    ) -> MessagingResult<Message> {
        if sender_id == receiver_id {
            return Err(MessagingError::Validation(
                "cannot send a message to yourself".to_string(),
            ));
        }

        let conversation = self.store.resolve(sender_id, receiver_id).await?;
        let message = self.store.append(conversation.id, sender_id, body).await?;
        counter!("parley_messages_sent_total").increment(1);

        let outcome = self.dispatcher.notify(receiver_id, &message).await;
        info!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            delivery = ?outcome,
            "message sent"
        );

        Ok(message)
    }

    /// Ordered history between `user_id` and `peer_id`; empty before first contact.
    #[instrument(name = "messaging.history", skip(self), err)]
    pub async fn conversation_history(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
    ) -> MessagingResult<Vec<MessageView>> {
        if user_id == peer_id {
            return Ok(Vec::new());
        }

        let Some(conversation) = self.store.find_between(user_id, peer_id).await? else {
            return Ok(Vec::new());
        };

        let messages = self.store.list_ordered(conversation.id).await?;
        Ok(messages.iter().map(MessageView::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        dispatcher::DeliveryDispatcher,
        memory_store::MemoryChatStore,
        presence::{PeerChannel, PresenceRegistry},
    };
    use shared::models::ServerEvent;

    fn service() -> (MessagingService, Arc<MemoryChatStore>, Arc<DeliveryDispatcher>) {
        let store = Arc::new(MemoryChatStore::new());
        let dispatcher = Arc::new(DeliveryDispatcher::new(Arc::new(PresenceRegistry::new())));
        let service = MessagingService::new(store.clone(), dispatcher.clone());
        (service, store, dispatcher)
    }

    #[tokio::test]
    async fn send_then_history_in_both_directions() {
        let (service, store, _) = service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let first = service.send_message(alice, bob, "hi").await.unwrap();
        let reply = service.send_message(bob, alice, "hello").await.unwrap();

        assert_eq!(first.conversation_id, reply.conversation_id);
        assert_eq!(store.conversation_count().await, 1);

        let history = service.conversation_history(bob, alice).await.unwrap();
        let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["hi", "hello"]);
        assert_eq!(history[0].sender_id, alice);
    }

    #[tokio::test]
    async fn history_before_first_contact_is_empty() {
        let (service, store, _) = service();
        let history = service
            .conversation_history(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        assert!(history.is_empty());
        assert_eq!(store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn sending_to_self_is_rejected() {
        let (service, store, _) = service();
        let alice = Uuid::new_v4();

        let err = service.send_message(alice, alice, "me").await.unwrap_err();
        assert!(matches!(err, MessagingError::Validation(_)));
        assert_eq!(store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn send_pushes_to_connected_receiver_only() {
        let (service, _, dispatcher) = service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (alice_channel, mut alice_rx) = PeerChannel::bounded(4);
        let (bob_channel, mut bob_rx) = PeerChannel::bounded(4);
        dispatcher.presence().connect(alice, alice_channel).await;
        dispatcher.presence().connect(bob, bob_channel).await;

        let sent = service.send_message(alice, bob, "ping").await.unwrap();

        match bob_rx.try_recv().unwrap() {
            ServerEvent::NewMessage(view) => assert_eq!(view.id, sent.id),
            other @ ServerEvent::Presence(_) => panic!("unexpected event {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_receiver_still_gets_history() {
        let (service, _, _) = service();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        service.send_message(alice, bob, "while you were out").await.unwrap();

        let history = service.conversation_history(bob, alice).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
