use std::{fmt, sync::Arc};

use sqlx::PgPool;

use crate::services::{
    chat_store::ChatStore,
    dispatcher::DeliveryDispatcher,
    memory_store::MemoryChatStore,
    messaging::MessagingService,
    pg_store::PgChatStore,
    presence::{PresenceRegistry, SharedPresenceRegistry},
};

/// Application state shared across all routes.
///
/// The presence registry is owned here rather than living in a global, so
/// every server (and every test) gets its own.
#[derive(Clone)]
pub struct AppState {
    pub(crate) pool: Option<PgPool>,
    pub(crate) store: Arc<dyn ChatStore>,
    pub(crate) presence: SharedPresenceRegistry,
    pub(crate) dispatcher: Arc<DeliveryDispatcher>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("has_pool", &self.pool.is_some())
            .field("presence", &self.presence)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(pool: Option<PgPool>, store: Arc<dyn ChatStore>) -> Self {
        let presence: SharedPresenceRegistry = Arc::new(PresenceRegistry::new());
        let dispatcher = Arc::new(DeliveryDispatcher::new(presence.clone()));
        Self {
            pool,
            store,
            presence,
            dispatcher,
        }
    }

    /// State backed by Postgres for storage and readiness.
    pub fn with_pool(pool: PgPool) -> Self {
        let store = Arc::new(PgChatStore::new(pool.clone()));
        Self::new(Some(pool), store)
    }

    /// State backed by an in-process store, with no database.
    pub fn in_memory(store: Arc<MemoryChatStore>) -> Self {
        Self::new(None, store)
    }

    pub fn messaging(&self) -> MessagingService {
        MessagingService::new(self.store.clone(), self.dispatcher.clone())
    }

    pub fn presence(&self) -> &SharedPresenceRegistry {
        &self.presence
    }

    pub fn dispatcher(&self) -> &Arc<DeliveryDispatcher> {
        &self.dispatcher
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory(Arc::new(MemoryChatStore::new()))
    }
}
