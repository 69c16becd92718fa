//! `/healthz`/`/metrics` wiring, against in-memory collaborator doubles
//! rather than a running Postgres instance.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fleet_app::http::build_router;
use fleet_app::state::AppState;
use fleet_qbit::testing::{InMemoryClientPool, InMemoryInstanceRegistry};
use fleet_stream::StreamManager;
use fleet_sync::SyncManager;
use fleet_telemetry::Metrics;
use tower::ServiceExt;

fn test_state() -> Arc<AppState> {
    let registry = Arc::new(InMemoryInstanceRegistry::new(Vec::new()));
    let pool = Arc::new(InMemoryClientPool::new(Vec::new()));
    let metrics = Arc::new(Metrics::new());
    let sync = Arc::new(SyncManager::new(pool, Arc::clone(&metrics)));
    let stream = StreamManager::new(registry, sync, Arc::clone(&metrics));
    AppState::new(stream, metrics)
}

#[tokio::test]
async fn healthz_reports_unready_until_marked() {
    let state = test_state();
    let router = build_router(Arc::clone(&state));

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.mark_ready();
    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_text_format() {
    let state = test_state();
    let router = build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("fleet_stream_active_subscriptions"));
}
