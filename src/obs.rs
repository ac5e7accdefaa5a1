//! Metrics naming and exposition.
//!
//! Counters/histograms/gauges are recorded via the `metrics` facade; a
//! `PrometheusBuilder`-installed recorder renders them for the `/metrics`
//! listener set up in `main.rs`.

use std::time::Duration;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const HTTP_REQUESTS_TOTAL: &str = "registration_relay_api_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "registration_relay_api_http_request_duration_seconds";
pub const PROVIDER_WEBSOCKETS: &str = "registration_relay_provider_websockets";

const DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0, 240.0];

/// Install the global Prometheus recorder and return a handle that renders
/// the current state as text for the `/metrics` endpoint.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(HTTP_REQUEST_DURATION.to_string()),
            DURATION_BUCKETS,
        )
        .expect("bucket set is non-empty")
        .install_recorder()
        .expect("only one recorder is installed per process")
}

/// Increment the live-provider gauge. Pair with [`provider_disconnected`].
pub fn provider_connected() {
    metrics::gauge!(PROVIDER_WEBSOCKETS).increment(1.0);
}

pub fn provider_disconnected() {
    metrics::gauge!(PROVIDER_WEBSOCKETS).decrement(1.0);
}

/// Tower/axum middleware recording the request counter and duration
/// histogram, labelled by matched route path, method, and response status.
pub async fn track_http(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let elapsed: Duration = start.elapsed();
    let status = response.status();

    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "path" => path.clone(),
        "method" => method.clone(),
        "status" => status.as_u16().to_string(),
    )
    .increment(1);

    metrics::histogram!(
        HTTP_REQUEST_DURATION,
        "path" => path,
        "method" => method,
    )
    .record(elapsed.as_secs_f64());

    response
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Router for the separate metrics listener: `/metrics` (Prometheus text
/// exposition) and `/healthz` (liveness).
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(healthz))
        .with_state(handle)
}
