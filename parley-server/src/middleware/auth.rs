use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{self, header},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use shared::config::server::Config;
use tracing::{debug, instrument};

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
    services::chat_store::SessionStore,
};

/// Resolves the session cookie to a user and records it on the request context.
///
/// Requests without a cookie, or with a token that no longer maps to a user,
/// are rejected with 401 before reaching a handler.
#[instrument(name = "auth", skip_all, fields(path = %req.uri().path()))]
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let cookie_name = req
        .extensions()
        .get::<Arc<Config>>()
        .map_or_else(
            || Config::default().session.session_cookie_name,
            |config| config.session.session_cookie_name.clone(),
        );

    let token = extract_session_cookie(req.headers(), &cookie_name)
        .ok_or_else(|| ApiError::unauthorized("missing session cookie"))?;

    let user_id = state
        .store
        .user_for_token(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("session is invalid or expired"))?;

    debug!(%user_id, "request authenticated");

    if let Some(context) = req.extensions_mut().get_mut::<RequestContext>() {
        context.user_id = Some(user_id);
    } else {
        req.extensions_mut().insert(RequestContext {
            request_id: String::new(),
            user_id: Some(user_id),
        });
    }

    Ok(next.run(req).await)
}

fn extract_session_cookie(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(header::COOKIE)?.to_str().ok()?;
    Cookie::split_parse(value)
        .flatten()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}
