use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, State, WebSocketUpgrade,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use server_api::ApiContext;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{ClientMessage, ConnectedClients, HealthResponse},
};
use storage::Storage;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod coordinator;
mod http;

use app_state::AppState;
use crate::config::{load_settings, prepare_database_url};
use coordinator::CoordinatorHandle;

/// Large enough for a base64-encoded video at the 100 MB media limit.
const MAX_REQUEST_BODY_BYTES: usize = 160 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    if settings.seed_filters {
        let seeded = storage
            .seed_default_filters()
            .await
            .context("failed to seed default filters")?;
        if seeded > 0 {
            info!(count = seeded, "seeded default filter catalog");
        }
    }

    let relay = CoordinatorHandle::spawn(Arc::new(storage.clone()), settings.capture_timeout());
    let api = ApiContext {
        storage,
        media_dir: settings.media_dir.clone(),
    };
    let app = build_router(Arc::new(AppState { api, relay }), &settings.cors_origins);

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(
        %addr,
        media_dir = %settings.media_dir.display(),
        capture_timeout_secs = settings.capture_timeout_secs,
        "photo booth relay listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/api/filters", get(http::list_filters).post(http::create_filter))
        .route(
            "/api/filters/:name",
            get(http::get_filter).delete(http::delete_filter),
        )
        .route("/api/filters/:name/use", post(http::record_filter_use))
        .route("/api/stats/filters", get(http::filter_usage_stats))
        .route("/api/media/photo", post(http::upload_photo))
        .route("/api/media/video", post(http::upload_video))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| warn!(%origin, "ignoring invalid CORS origin"))
                .ok()
        }))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ApiError>)> {
    let snapshot = state.relay.snapshot().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    let status = match state.api.storage.health_check().await {
        Ok(()) => "ok",
        Err(err) => {
            warn!(error = %err, "catalog database health check failed");
            "degraded"
        }
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        connected_clients: ConnectedClients {
            display: snapshot.presence.display_connected,
            control: snapshot.presence.control_connected,
        },
        current_filter: snapshot.current_filter,
        capture_in_progress: snapshot.capture_in_progress,
        open_connections: snapshot.open_connections,
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, events) = mpsc::unbounded_channel();
    let connection_id = state.relay.connect(outbound);
    let mut events = UnboundedReceiverStream::new(events);

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(err) => {
                    warn!(kind = event.kind(), error = %err, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => state.relay.dispatch(connection_id, message),
                Err(err) => warn!(%connection_id, error = %err, "ignoring malformed frame"),
            },
            Message::Close(_) => break,
            _ => debug!(%connection_id, "ignoring non-text frame"),
        }
    }

    state.relay.disconnect(connection_id);
    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
