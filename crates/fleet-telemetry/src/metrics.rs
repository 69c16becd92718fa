//! Prometheus metrics registry for the fleet management plane.
//!
//! One [`Metrics`] handle is constructed at startup and shared (via `Arc`)
//! across the Sync Manager, Stream Manager, Tracker Rules Engine, and Backup
//! Service, each recording into its own subset of the registered collectors.

use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder,
};

/// Shared metrics handle.
pub struct Metrics {
    registry: Registry,
    /// Count of sync polls, labeled by outcome (`success`/`failure`).
    pub sync_polls_total: IntCounterVec,
    /// Currently active SSE subscriptions.
    pub active_subscriptions: IntGauge,
    /// Currently active subscription groups.
    pub active_groups: IntGauge,
    /// Backup run completions, labeled by status.
    pub backup_runs_total: IntCounterVec,
    /// Backup run wall-clock duration in seconds.
    pub backup_duration_seconds: HistogramVec,
    /// Tracker rule mutation calls issued, labeled by kind (`limit`/`delete`).
    pub rules_mutations_total: IntCounterVec,
}

impl Metrics {
    /// Construct a fresh registry with all collectors registered.
    ///
    /// # Panics
    ///
    /// Panics if a collector fails to register, which only happens on a
    /// duplicate metric name and indicates a programming error.
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let sync_polls_total = IntCounterVec::new(
            prometheus::Opts::new("fleet_sync_polls_total", "Sync Manager poll outcomes"),
            &["outcome"],
        )
        .expect("valid metric");
        let active_subscriptions = IntGauge::new(
            "fleet_stream_active_subscriptions",
            "Currently open SSE subscriptions",
        )
        .expect("valid metric");
        let active_groups = IntGauge::new(
            "fleet_stream_active_groups",
            "Currently active subscription groups",
        )
        .expect("valid metric");
        let backup_runs_total = IntCounterVec::new(
            prometheus::Opts::new("fleet_backup_runs_total", "Backup run completions"),
            &["status"],
        )
        .expect("valid metric");
        let backup_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "fleet_backup_duration_seconds",
                "Backup run wall-clock duration",
            ),
            &["kind"],
        )
        .expect("valid metric");
        let rules_mutations_total = IntCounterVec::new(
            prometheus::Opts::new("fleet_rules_mutations_total", "Tracker rule mutations issued"),
            &["kind"],
        )
        .expect("valid metric");

        registry
            .register(Box::new(sync_polls_total.clone()))
            .expect("register sync_polls_total");
        registry
            .register(Box::new(active_subscriptions.clone()))
            .expect("register active_subscriptions");
        registry
            .register(Box::new(active_groups.clone()))
            .expect("register active_groups");
        registry
            .register(Box::new(backup_runs_total.clone()))
            .expect("register backup_runs_total");
        registry
            .register(Box::new(backup_duration_seconds.clone()))
            .expect("register backup_duration_seconds");
        registry
            .register(Box::new(rules_mutations_total.clone()))
            .expect("register rules_mutations_total");

        Self {
            registry,
            sync_polls_total,
            active_subscriptions,
            active_groups,
            backup_runs_total,
            backup_duration_seconds,
            rules_mutations_total,
        }
    }

    /// Render the current state in the Prometheus text exposition format.
    ///
    /// # Panics
    ///
    /// Panics if the encoder produces non-UTF-8 output, which cannot happen
    /// for the text encoder.
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("encode metrics");
        String::from_utf8(buffer).expect("prometheus text encoding is UTF-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.sync_polls_total.with_label_values(&["success"]).inc();
        metrics.active_subscriptions.set(3);

        let rendered = metrics.render();
        assert!(rendered.contains("fleet_sync_polls_total"));
        assert!(rendered.contains("fleet_stream_active_subscriptions"));
    }
}
