use std::sync::Arc;

use crate::{app_state::AppState, openapi::ApiDoc};
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use utoipa::OpenApi;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn openapi_yaml() -> impl IntoResponse {
    match ApiDoc::openapi().to_yaml() {
        Ok(yaml) => (StatusCode::OK, yaml),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("YAML error: {e}"),
        ),
    }
}

pub fn openapi_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/openapi.yaml", get(openapi_yaml))
}
