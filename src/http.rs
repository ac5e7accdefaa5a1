//! HTTP surface: health check, provider WebSocket upgrade, and the bridge
//! command endpoint. Router construction mirrors the teacher's
//! `build_router` (state-carrying `Router`, `tower-http` middleware layered
//! on top).

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info_span;

use crate::{auth::AuthState, error::RelayError, obs, registry::Registry, session};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub shutdown: CancellationToken,
}

/// Build the full router. `auth` is `Some` iff `validate_auth_url` was
/// configured, in which case it wraps only the bridge POST route.
pub fn build_router(state: AppState, auth: Option<AuthState>) -> Router {
    let bridge_route = match auth {
        Some(auth_state) => Router::new()
            .route("/api/v1/bridge/:command", post(bridge_command))
            .layer(middleware::from_fn_with_state(
                auth_state,
                crate::auth::require_valid_token,
            )),
        None => Router::new().route("/api/v1/bridge/:command", post(bridge_command)),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/provider", get(provider_upgrade))
        .merge(bridge_route)
        .route_layer(middleware::from_fn(obs::track_http))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<Body>| {
                info_span!("http_request", method = %request.method(), path = %request.uri().path(), identifier = tracing::field::Empty)
            }),
        )
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn provider_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session::run(socket, state.registry, state.shutdown))
}

/// POST /api/v1/bridge/:command — look the presented code up in the
/// registry and dispatch `command` to that provider session.
async fn bridge_command(
    Path(command): Path<String>,
    headers: axum::http::HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, RelayError> {
    let code = bearer_code(&headers)?;

    let session = state.registry.get(&code).await.ok_or(RelayError::NotFound)?;

    match session.execute_command(&command).await? {
        Some(payload) => {
            let body = serde_json::to_vec(&payload)
                .map_err(|e| RelayError::Internal(format!("encode response: {e}")))?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response())
        }
        // `execute_command` on an unregistered session — see DESIGN.md.
        None => Ok((StatusCode::OK, Body::empty()).into_response()),
    }
}

fn bearer_code(headers: &axum::http::HeaderMap) -> Result<String, RelayError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayError::MissingBearer)?;
    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or(RelayError::MissingBearer)
}
