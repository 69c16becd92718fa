//! Ambient HTTP surface: `/stream`, `/healthz`, `/metrics`.
//!
//! One `Router` built from merged route groups, `TraceLayer` for request
//! spans, and a plain-text Prometheus `/metrics` handler.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    if state.is_ready() {
        (StatusCode::OK, Json(HealthResponse { status: "ok" }))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { status: "starting" }))
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let body = state.telemetry.render();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .expect("valid metrics response")
}

/// Build the full application router: `/stream` (state-scoped to the Stream
/// Manager alone) merged with the ambient `/healthz`/`/metrics` pair.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    let stream_router = Router::new()
        .route("/stream", get(fleet_stream::stream_handler))
        .with_state(Arc::clone(&state.stream));

    let ambient_router = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state);

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "http.request",
            method = %request.method(),
            path = %request.uri().path(),
            status_code = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }).on_response(|response: &Response, latency: Duration, span: &Span| {
        span.record("status_code", response.status().as_u16());
        span.record("latency_ms", u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
    });

    stream_router.merge(ambient_router).layer(ServiceBuilder::new().layer(trace_layer))
}
