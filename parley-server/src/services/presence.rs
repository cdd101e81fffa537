use std::{collections::HashMap, sync::Arc};

use shared::models::ServerEvent;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard, mpsc};
use tracing::debug;
use uuid::Uuid;

pub type SharedPresenceRegistry = Arc<PresenceRegistry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection closed")]
    Closed,
}

/// Sending half of one connection's bounded outbound queue.
#[derive(Debug, Clone)]
pub struct PeerChannel {
    connection_id: Uuid,
    sender: mpsc::Sender<ServerEvent>,
}

impl PeerChannel {
    /// Creates a channel and the receiver its writer task drains.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let channel = Self {
            connection_id: Uuid::new_v4(),
            sender,
        };
        (channel, receiver)
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Non-blocking write. A full queue fails the same way a closed one does.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.sender.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Process-local table of users with an open delivery channel.
///
/// Reads (snapshots, broadcasts) share the lock; connect and disconnect take
/// it exclusively. One entry per user: a second connection replaces the first.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    peers: RwLock<HashMap<Uuid, PeerChannel>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `channel` for `user_id`, returning the entry it replaced.
    ///
    /// Dropping the returned channel closes the previous connection's queue,
    /// which ends its writer task.
    pub async fn connect(&self, user_id: Uuid, channel: PeerChannel) -> Option<PeerChannel> {
        let connection_id = channel.connection_id;
        let previous = self.peers.write().await.insert(user_id, channel);
        debug!(%user_id, %connection_id, replaced = previous.is_some(), "peer connected");
        previous
    }

    /// Removes the entry for `user_id`. Removing an absent user is a no-op.
    pub async fn disconnect(&self, user_id: Uuid) -> bool {
        let removed = self.peers.write().await.remove(&user_id).is_some();
        if removed {
            debug!(%user_id, "peer disconnected");
        }
        removed
    }

    /// Removes the entry only while it still belongs to `connection_id`, so a
    /// connection that was replaced cannot evict its successor.
    pub async fn disconnect_connection(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut peers = self.peers.write().await;
        let owned = peers
            .get(&user_id)
            .is_some_and(|channel| channel.connection_id == connection_id);
        if owned {
            peers.remove(&user_id);
            debug!(%user_id, %connection_id, "peer disconnected");
        }
        owned
    }

    /// Sorted ids of every connected user.
    pub async fn snapshot(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.peers.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn channel_for(&self, user_id: Uuid) -> Option<PeerChannel> {
        self.peers.read().await.get(&user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, PeerChannel>> {
        self.peers.read().await
    }
}
