use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;

use crate::{app_state::AppState, db::bootstrap};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    online_users: Option<usize>,
}

fn record(endpoint: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!("parley_health_checks_total", "endpoint" => endpoint, "status" => status)
        .increment(1);
}

/// Liveness: the process is serving requests.
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    record("healthz", true);
    let online_users = state.presence().len().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            online_users: Some(online_users),
        }),
    )
}

/// Readiness: the database answers the health procedure.
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = match state.pool.as_ref() {
        None => "no_db",
        Some(pool) => match bootstrap::ensure_readiness(pool).await {
            Ok(()) => "ready",
            Err(err) => {
                tracing::warn!(error = %err, "readiness probe failed");
                "degraded"
            }
        },
    };

    let ready = status == "ready";
    record("readyz", ready);
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            status,
            online_users: None,
        }),
    )
}

pub fn create_health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
