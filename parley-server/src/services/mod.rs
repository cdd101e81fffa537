pub mod chat_store;
pub mod conversation_service;
pub mod dispatcher;
pub mod memory_store;
pub mod message_service;
pub mod messaging;
pub mod pg_store;
pub mod presence;
pub mod user_service;
