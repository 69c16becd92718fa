//! Typed configuration models.
//!
//! # Design
//! - Pure data carriers; `loader.rs` is the only place that reads the
//!   environment, keeping these types trivially testable.

use std::time::Duration;

use crate::defaults;

/// Stream Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Starting sync-loop interval before any backoff is applied.
    pub default_sync_interval: Duration,
    /// Ceiling for the backoff-widened sync interval.
    pub max_sync_interval: Duration,
    /// Heartbeat keepalive cadence.
    pub heartbeat_interval: Duration,
    /// Page size applied when a descriptor omits `limit`.
    pub default_limit: u32,
    /// Largest accepted `limit`.
    pub max_limit: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_sync_interval: defaults::DEFAULT_SYNC_INTERVAL,
            max_sync_interval: defaults::MAX_SYNC_INTERVAL,
            heartbeat_interval: defaults::HEARTBEAT_INTERVAL,
            default_limit: defaults::DEFAULT_LIMIT,
            max_limit: defaults::MAX_LIMIT,
        }
    }
}

/// Tracker Rules Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesConfig {
    /// Cadence at which every active instance is scanned.
    pub scan_interval: Duration,
    /// Debounce window for re-applying limits to an already-applied hash.
    pub skip_within: Duration,
    /// Maximum hashes grouped into a single mutation API call.
    pub max_batch_hashes: usize,
    /// Days of activity history retained before pruning.
    pub activity_retention_days: i64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            scan_interval: defaults::SCAN_INTERVAL,
            skip_within: defaults::SKIP_WITHIN,
            max_batch_hashes: defaults::MAX_BATCH_HASHES,
            activity_retention_days: defaults::ACTIVITY_RETENTION_DAYS,
        }
    }
}

/// Backup Service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Root directory for manifests and blob storage. Required; must exist
    /// and be writable at startup (§7 Fatal startup).
    pub data_dir: String,
    /// Scheduler tick cadence.
    pub poll_interval: Duration,
    /// Number of concurrent backup worker tasks.
    pub worker_count: usize,
}

/// Top-level application configuration, assembled once at startup and never
/// mutated afterward (hot-reload is an explicit non-goal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Stream Manager settings.
    pub stream: StreamConfig,
    /// Tracker Rules Engine settings.
    pub rules: RulesConfig,
    /// Backup Service settings.
    pub backup: BackupConfig,
    /// Postgres connection string for the shared `fleet-data` store.
    pub database_url: String,
    /// HTTP bind address for the ambient application shell.
    pub bind_addr: String,
    /// HTTP port for the ambient application shell.
    pub http_port: u16,
    /// `RUST_LOG`-style logging level.
    pub log_level: String,
    /// Logging output format (`"json"` or `"pretty"`).
    pub log_format: String,
}
