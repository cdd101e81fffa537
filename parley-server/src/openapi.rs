#![allow(clippy::needless_for_each)] // Derive macro emits a for_each internally

use shared::models::{Message, MessageView, SendMessageRequest, Timestamp, UserSummary};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Parley API",
        version = "1.0.0",
        description = "Direct messages, conversation history and live presence"
    ),
    paths(
        crate::handlers::messages::send_message,
        crate::handlers::messages::get_conversation,
        crate::handlers::users::list_users,
        crate::handlers::realtime::realtime_socket,
    ),
    components(
        schemas(
            Message,
            MessageView,
            SendMessageRequest,
            Timestamp,
            UserSummary,
        )
    ),
    tags(
        (name = "Messages", description = "Sending and reading direct messages"),
        (name = "Users", description = "User directory"),
        (name = "Realtime", description = "Presence and live delivery socket")
    )
)]
#[derive(Debug)]
pub struct ApiDoc;
