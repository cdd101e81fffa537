//! Frames pushed to connected clients over the realtime socket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MessageView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceEventKind {
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers,
}

/// Full set of currently connected users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    #[serde(rename = "type")]
    pub kind: PresenceEventKind,
    pub content: Vec<Uuid>,
}

impl PresenceUpdate {
    #[must_use]
    pub fn online_users(content: Vec<Uuid>) -> Self {
        Self {
            kind: PresenceEventKind::OnlineUsers,
            content,
        }
    }
}

/// Any frame the server writes to a client. Presence updates carry a `type`
/// tag; new-message pushes are the bare message view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerEvent {
    Presence(PresenceUpdate),
    NewMessage(MessageView),
}

impl From<PresenceUpdate> for ServerEvent {
    fn from(value: PresenceUpdate) -> Self {
        Self::Presence(value)
    }
}

impl From<MessageView> for ServerEvent {
    fn from(value: MessageView) -> Self {
        Self::NewMessage(value)
    }
}
