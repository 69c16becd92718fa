//! Shared state handed to every axum handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fleet_stream::StreamManager;
use fleet_telemetry::Metrics;

/// Application state shared across the `/stream`, `/healthz`, and `/metrics`
/// handlers.
pub struct AppState {
    /// Stream Manager, driving `/stream`.
    pub stream: Arc<StreamManager>,
    /// Shared Prometheus registry, driving `/metrics`.
    pub telemetry: Arc<Metrics>,
    ready: AtomicBool,
}

impl AppState {
    /// Construct state not yet marked ready; `/healthz` reports `503` until
    /// [`Self::mark_ready`] is called once startup completes.
    #[must_use]
    pub fn new(stream: Arc<StreamManager>, telemetry: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            stream,
            telemetry,
            ready: AtomicBool::new(false),
        })
    }

    /// Mark startup as complete: the Sync Manager, Tracker Rules Engine, and
    /// Backup Service have all finished their initial wiring.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Whether `/healthz` should report healthy.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.stream.is_shutting_down()
    }
}
