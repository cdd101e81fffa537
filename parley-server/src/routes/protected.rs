use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tracing::info;

use crate::{
    app_state::AppState,
    handlers::{messages, realtime, users},
    middleware::auth::auth_middleware,
};

/// Routes that require an authenticated session, mounted under `/api`.
pub fn create_router_protected(state: Arc<AppState>) -> Router<Arc<AppState>> {
    info!("Creating protected router");
    Router::new()
        .route(
            "/messages/send/{receiver_id}",
            post(messages::send_message),
        )
        .route("/messages/{to_user_id}", get(messages::get_conversation))
        .route("/users", get(users::list_users))
        .route("/ws", get(realtime::realtime_socket))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
