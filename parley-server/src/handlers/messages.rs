use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use shared::models::{Message, MessageView, SendMessageRequest};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
};

/// Send a direct message, creating the conversation on first contact.
#[utoipa::path(
    post,
    path = "/api/messages/send/{receiver_id}",
    params(("receiver_id" = Uuid, Path, description = "User receiving the message")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = Message),
        (status = 400, description = "Empty body or message to self"),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "Messages"
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(receiver_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let sender_id = context.require_user()?;
    request.validate().map_err(ApiError::bad_request)?;

    let message = state
        .messaging()
        .send_message(sender_id, receiver_id, &request.message)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Conversation history with another user, oldest first.
#[utoipa::path(
    get,
    path = "/api/messages/{to_user_id}",
    params(("to_user_id" = Uuid, Path, description = "The other participant")),
    responses(
        (status = 200, description = "Ordered messages, empty before first contact", body = [MessageView]),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "Messages"
)]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(to_user_id): Path<Uuid>,
) -> AppResult<Json<Vec<MessageView>>> {
    let user_id = context.require_user()?;
    let history = state
        .messaging()
        .conversation_history(user_id, to_user_id)
        .await?;
    Ok(Json(history))
}
