pub mod messages;
pub mod realtime;
pub mod users;
