use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::Context;
use axum::{
    Extension, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::server::{Config, DatabaseConfig, LogFormat};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::AppState,
    db::bootstrap,
    middleware::request_context::{self, RequestIdState},
    routes::{self, openapi::openapi_routes},
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Installs the process-wide Prometheus recorder on first use.
///
/// Returns `None` if another recorder was installed first, in which case
/// `/metrics` reports the exporter as unavailable.
pub fn metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "failed to install Prometheus recorder");
                None
            }
        })
        .clone()
}

async fn metrics_endpoint(
    Extension(handle): Extension<Option<PrometheusHandle>>,
) -> impl IntoResponse {
    match handle {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            "metrics exporter unavailable".to_string(),
        ),
    }
}

/// Initializes the tracing subscriber for logging using the provided configuration.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let installed = if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .parse_lossy("")
        })
    })
}

/// Creates a database connection pool from the database configuration.
///
/// # Errors
/// Returns an error if the database connection pool cannot be created.
pub async fn create_database_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&db.url)
        .await?;
    metrics::gauge!("parley_db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// Creates the CORS layer for the application.
///
/// Credentials are only allowed together with an explicit origin list, since
/// browsers reject credentialed responses to a wildcard origin.
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    let cors_config = &config.server.cors;
    let origins = cors_config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .max_age(Duration::from_secs(cors_config.max_age_seconds));

    if origins.is_empty() {
        cors.allow_origin(AllowOrigin::any())
            .allow_headers(AllowHeaders::any())
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(cors_config.allow_credentials)
    }
}

/// Creates the API router mounted under `/api`.
pub fn create_api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    routes::protected::create_router_protected(state)
}

/// Creates the main application router with all middleware and routes.
///
/// Layers wrap every route added before them, so routes come first. The
/// request-id layer sits outside the trace layer so spans carry the id.
pub fn create_app_router(
    state: Arc<AppState>,
    config: Arc<Config>,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let cors = create_cors_layer(&config);
    let request_id_state = RequestIdState::from_config(&config);

    Router::new()
        .nest("/api", create_api_router(state.clone()))
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .merge(openapi_routes())
        .layer(cors)
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .layer(Extension(metrics_handle))
        .layer(Extension(config))
        .with_state(state)
}

/// Creates the graceful shutdown signal handler.
pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

/// Connects to Postgres, applies the bootstrap scripts and checks readiness.
///
/// # Errors
/// Returns an error if any step fails.
pub async fn prepare_database(config: &DatabaseConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool = create_database_pool(config)
        .await
        .context("failed to connect to database")?;

    bootstrap::ensure_liveness(&pool)
        .await
        .context("database liveness check failed")?;

    let applied = bootstrap::run(&pool, config)
        .await
        .context("database bootstrap failed")?;
    info!(scripts = applied, "database bootstrap complete");

    bootstrap::ensure_readiness(&pool)
        .await
        .context("database readiness check failed")?;

    Ok(pool)
}

/// Starts the backend server and binds it to the configured port.
///
/// # Errors
/// Returns an error if the database cannot be prepared or the listener fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    initialize_tracing(&config);
    info!(profile = ?config.profile, "Starting server...");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);

    let pool = prepare_database(&config.db).await?;
    let state = Arc::new(AppState::with_pool(pool));
    let app = create_app_router(state, config.clone(), metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shared::config::server::Profile;
    use std::{
        io::{self, Write},
        sync::{Arc, Mutex},
    };
    use tracing::Subscriber;
    use tracing_subscriber::fmt::{self, MakeWriter};

    #[derive(Clone)]
    struct BufferMakeWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferMakeWriter {
        fn new(buffer: Arc<Mutex<Vec<u8>>>) -> Self {
            Self { buffer }
        }
    }

    struct BufferWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> MakeWriter<'a> for BufferMakeWriter {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            BufferWriter {
                buffer: Arc::clone(&self.buffer),
            }
        }
    }

    impl Write for BufferWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn initialize_tracing_returns_configured_level() {
        let config = Config::default_for_profile(Profile::Dev);
        assert_eq!(initialize_tracing(&config), config.logging.level);
    }

    #[test]
    fn json_log_format_produces_json_output() {
        let mut config = Config::default_for_profile(Profile::Dev);
        config.logging.format = LogFormat::Json;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let make_writer = BufferMakeWriter::new(buffer.clone());

        let subscriber = subscriber_with_writer(&config, make_writer);
        let dispatch = tracing::dispatcher::Dispatch::new(subscriber);

        tracing::dispatcher::with_default(&dispatch, || {
            info!(event = "json_test", "log entry");
        });

        let contents = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let line = contents
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap();
        let value: Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["fields"]["message"], "log entry");
        assert_eq!(value["fields"]["event"], "json_test");
    }

    #[test]
    fn text_log_format_emits_plain_events() {
        let mut config = Config::default_for_profile(Profile::Dev);
        config.logging.format = LogFormat::Text;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let make_writer = BufferMakeWriter::new(buffer.clone());

        let subscriber = subscriber_with_writer(&config, make_writer);
        let dispatch = tracing::dispatcher::Dispatch::new(subscriber);

        tracing::dispatcher::with_default(&dispatch, || {
            info!(event = "text_test", "log entry");
        });

        let contents = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let line = contents
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap();
        assert!(
            serde_json::from_str::<Value>(line).is_err(),
            "expected plain text log line"
        );
        assert!(line.contains("log entry"));
    }

    fn subscriber_with_writer<W>(config: &Config, writer: W) -> Box<dyn Subscriber + Send + Sync>
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        let env_filter = super::build_env_filter(config);
        let builder = fmt::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(writer);

        if matches!(config.logging.format, LogFormat::Json) {
            Box::new(builder.json().with_ansi(false).finish())
        } else {
            Box::new(builder.with_ansi(true).finish())
        }
    }

    fn test_app() -> Router {
        let config = Arc::new(Config::default_for_profile(Profile::Test));
        create_app_router(Arc::new(AppState::default()), config, super::metrics_handle())
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_payload() {
        use axum::body::{Body, to_bytes};
        use axum::http::Request;
        use tower::ServiceExt;

        let app = test_app();
        metrics::counter!("parley_test_probe_total").increment(1);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, "text/plain; version=0.0.4");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("parley_test_probe_total"));
    }

    #[tokio::test]
    async fn api_routes_require_a_session_and_echo_request_id() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/users")
                    .header("x-request-id", "trace-me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-me");
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let config = Arc::new(Config::default_for_profile(Profile::Dev));
        let app = create_app_router(Arc::new(AppState::default()), config, None);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/users")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .unwrap(),
            "true"
        );
    }
}
