//! WebSocket endpoint feeding the presence registry.
//!
//! Each connection gets a bounded outbound queue drained by a writer task,
//! plus a reader loop that only watches for closure. Whichever side finishes
//! first ends the connection, after which the registry entry is released and
//! the online set is broadcast once. A connection that was already evicted or
//! replaced leaves the broadcast to whoever removed it.

use std::{sync::Arc, time::Duration};

use axum::{
    Extension,
    body::Bytes,
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use shared::config::server::{Config, RealtimeConfig};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
    services::{dispatcher::DeliveryDispatcher, presence::PeerChannel},
};

#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub queue_capacity: usize,
    pub heartbeat: Duration,
    /// `None` keeps idle connections open indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl From<&RealtimeConfig> for ConnectionSettings {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            queue_capacity: config.outbound_queue_capacity,
            heartbeat: Duration::from_secs(config.heartbeat_seconds.max(1)),
            idle_timeout: (config.idle_timeout_seconds > 0)
                .then(|| Duration::from_secs(config.idle_timeout_seconds)),
        }
    }
}

/// Requests without an `Origin` header come from non-browser clients and pass.
fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get(header::ORIGIN) {
        None => true,
        Some(origin) => origin
            .to_str()
            .is_ok_and(|origin| allowed.iter().any(|candidate| candidate == origin)),
    }
}

/// Upgrade to the realtime socket.
#[utoipa::path(
    get,
    path = "/api/ws",
    responses(
        (status = 101, description = "Switching to the realtime WebSocket"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Origin not allowed")
    ),
    tag = "Realtime"
)]
pub async fn realtime_socket(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Extension(config): Extension<Arc<Config>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user_id = context.require_user()?;

    if !origin_allowed(&headers, &config.realtime.allowed_origins) {
        warn!(%user_id, "rejected websocket upgrade from disallowed origin");
        return Err(ApiError::forbidden("origin not allowed"));
    }

    let settings = ConnectionSettings::from(&config.realtime);
    let dispatcher = state.dispatcher().clone();

    Ok(ws.on_upgrade(move |socket| run_connection(socket, user_id, dispatcher, settings)))
}

pub(crate) async fn run_connection(
    socket: WebSocket,
    user_id: Uuid,
    dispatcher: Arc<DeliveryDispatcher>,
    settings: ConnectionSettings,
) {
    let (channel, mut outbound) = PeerChannel::bounded(settings.queue_capacity);
    let connection_id = channel.connection_id();
    let presence = dispatcher.presence().clone();

    if presence.connect(user_id, channel).await.is_some() {
        debug!(%user_id, %connection_id, "replaced existing connection");
    }
    info!(%user_id, %connection_id, "realtime connection opened");
    dispatcher.broadcast_presence().await;

    let (mut sink, mut stream) = socket.split();

    let heartbeat = settings.heartbeat;
    let mut writer = tokio::spawn(async move {
        let mut ticker = interval(heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(error = %err, "failed to encode realtime event");
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sink.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sink.send(WsMessage::Close(None)).await;
    });

    let idle_timeout = settings.idle_timeout;
    let mut reader = tokio::spawn(async move {
        loop {
            let next = match idle_timeout {
                Some(limit) => {
                    if let Ok(next) = timeout(limit, stream.next()).await {
                        next
                    } else {
                        debug!("idle timeout elapsed");
                        break;
                    }
                }
                None => stream.next().await,
            };

            match next {
                None | Some(Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(error = %err, "websocket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    let released = presence.disconnect_connection(user_id, connection_id).await;
    info!(%user_id, %connection_id, released, "realtime connection closed");
    if released {
        dispatcher.broadcast_presence().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use shared::config::server::Profile;

    fn headers_with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn empty_allowlist_accepts_any_origin() {
        assert!(origin_allowed(&headers_with_origin("https://evil.example"), &[]));
    }

    #[test]
    fn allowlist_is_exact_match() {
        let allowed = vec!["http://localhost:5173".to_string()];
        assert!(origin_allowed(&headers_with_origin("http://localhost:5173"), &allowed));
        assert!(!origin_allowed(&headers_with_origin("http://localhost:5174"), &allowed));
        assert!(origin_allowed(&HeaderMap::new(), &allowed));
    }

    #[test]
    fn settings_follow_realtime_config() {
        let mut config = Config::default_for_profile(Profile::Test).realtime;
        config.outbound_queue_capacity = 8;
        config.heartbeat_seconds = 5;
        config.idle_timeout_seconds = 0;

        let settings = ConnectionSettings::from(&config);
        assert_eq!(settings.queue_capacity, 8);
        assert_eq!(settings.heartbeat, Duration::from_secs(5));
        assert!(settings.idle_timeout.is_none());

        config.idle_timeout_seconds = 12;
        assert_eq!(
            ConnectionSettings::from(&config).idle_timeout,
            Some(Duration::from_secs(12))
        );
    }
}
