use std::sync::Arc;

use axum::{Extension, Json, extract::State};
use shared::models::UserSummary;

use crate::{
    app_state::AppState, http::error::AppResult, middleware::request_context::RequestContext,
    services::chat_store::UserDirectory,
};

/// Everyone except the caller, for the sidebar.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Other users ordered by full name", body = [UserSummary]),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let user_id = context.require_user()?;
    let users = state.store.list_others(user_id).await?;
    Ok(Json(users))
}
