pub mod conversation;
pub mod message;
pub mod realtime;
pub mod timestamp;
pub mod user;

pub use conversation::{Conversation, PairKey};
pub use message::{Message, MessageView, SendMessageRequest};
pub use realtime::{PresenceEventKind, PresenceUpdate, ServerEvent};
pub use timestamp::Timestamp;
pub use user::UserSummary;
