//! Numeric defaults fixed by the external interface.

use std::time::Duration;

/// Stream Manager: starting sync-loop interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(2);
/// Stream Manager: ceiling for the backoff-widened sync interval.
pub const MAX_SYNC_INTERVAL: Duration = Duration::from_secs(30);
/// Stream Manager: heartbeat cadence, fixed (not backed off).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Stream Manager: page size when a descriptor omits `limit`.
pub const DEFAULT_LIMIT: u32 = 300;
/// Stream Manager: largest accepted `limit`.
pub const MAX_LIMIT: u32 = 2000;

/// Tracker Rules: scan cadence.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(20);
/// Tracker Rules: debounce window for re-applying limits to the same hash.
pub const SKIP_WITHIN: Duration = Duration::from_secs(120);
/// Tracker Rules: debounce window for re-queuing a deletion of the same hash.
pub const SKIP_DELETE_WITHIN: Duration = Duration::from_secs(300);
/// Tracker Rules: age at which a sweep evicts a debounce entry.
pub const DEBOUNCE_SWEEP_AGE: Duration = Duration::from_secs(600);
/// Tracker Rules: interval between debounce-map sweeps.
pub const DEBOUNCE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
/// Tracker Rules: maximum hashes per mutation API call.
pub const MAX_BATCH_HASHES: usize = 50;
/// Tracker Rules: days of activity history retained.
pub const ACTIVITY_RETENTION_DAYS: i64 = 7;

/// Backup Service: scheduler tick cadence.
pub const BACKUP_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Backup Service: recovery/retention chunk size (storage bind-parameter cap).
pub const RECOVERY_CHUNK_SIZE: usize = 1000;
/// Backup Service: how many recent runs of a `(instance, kind)` pair to
/// inspect when determining whether a scheduled backup was missed.
pub const MISSED_BACKUP_LOOKBACK: i64 = 10;
