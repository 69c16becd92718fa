//! Scheduler tick loop and missed-backup recovery, using the same
//! cancellable `tokio::select!` loop `fleet_stream::manager`/
//! `fleet_rules::engine` use for their own periodic loops.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use fleet_data::model::{BackupKind, BackupSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{BackupError, BackupResult};
use crate::repository::BackupRepository;

const MISSED_BACKUP_LOOKBACK: usize = 10;

/// Submits a run for execution, enforcing the single-writer-per-instance
/// invariant. Implemented by [`crate::service::BackupService`]; kept
/// separate from [`BackupRepository`] because submission also needs the
/// in-memory inflight set and job channel, not just the persistence layer.
#[async_trait]
pub trait RunQueuer: Send + Sync {
    /// Queue `kind` for `instance_id`, attributed to `requested_by`.
    async fn queue(&self, instance_id: i64, kind: BackupKind, requested_by: &str) -> BackupResult<i64>;
}

/// The recurrence interval for a cadence, excluding `Manual` (which has no
/// schedule to miss).
fn cadence_interval(kind: BackupKind) -> Option<ChronoDuration> {
    match kind {
        BackupKind::Hourly => Some(ChronoDuration::hours(1)),
        BackupKind::Daily => Some(ChronoDuration::days(1)),
        BackupKind::Weekly => Some(ChronoDuration::weeks(1)),
        BackupKind::Monthly | BackupKind::Manual => None,
    }
}

/// `isBackupMissed`: whether `kind` is due for `settings`'s instance as of
/// `now`, given its most recent successful run (if any).
pub fn is_backup_missed(settings: &BackupSettings, kind: BackupKind, last_success: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if !settings.kind_enabled(kind) {
        return false;
    }
    let Some(reference_time) = last_success else {
        return true;
    };
    match kind {
        BackupKind::Monthly => reference_time
            .checked_add_months(Months::new(1))
            .is_none_or(|due| due <= now),
        BackupKind::Hourly | BackupKind::Daily | BackupKind::Weekly => {
            cadence_interval(kind).is_some_and(|interval| reference_time + interval <= now)
        }
        BackupKind::Manual => false,
    }
}

/// Queues the first missed cadence found for `instance_id`, in
/// hourly→daily→weekly→monthly order, at most one per instance. Returns
/// `true` if a run was queued (or skipped as busy, which also counts as
/// "handled" for this instance this sweep).
async fn queue_missed_kind<R: BackupRepository + ?Sized, Q: RunQueuer + ?Sized>(
    repo: &R,
    queuer: &Q,
    settings: &BackupSettings,
    requested_by: &str,
    now: DateTime<Utc>,
) -> bool {
    for kind in BackupKind::recurring() {
        if !settings.kind_enabled(kind) {
            continue;
        }
        let last_success = match repo.list_runs(settings.instance_id, kind).await {
            Ok(runs) => runs
                .into_iter()
                .take(MISSED_BACKUP_LOOKBACK)
                .find(|r| r.status == fleet_data::model::RunStatus::Success)
                .and_then(|r| r.completed_at),
            Err(err) => {
                warn!(instance_id = settings.instance_id, kind = kind.as_str(), error = %err, "failed to inspect run history");
                continue;
            }
        };
        if !is_backup_missed(settings, kind, last_success, now) {
            continue;
        }
        match queuer.queue(settings.instance_id, kind, requested_by).await {
            Ok(run_id) => {
                info!(instance_id = settings.instance_id, kind = kind.as_str(), run_id, "queued missed backup");
                return true;
            }
            Err(BackupError::InstanceBusy { .. }) => {
                debug!(instance_id = settings.instance_id, kind = kind.as_str(), "missed backup skipped, instance busy");
                return true;
            }
            Err(err) => {
                error!(instance_id = settings.instance_id, kind = kind.as_str(), error = %err, "failed to queue missed backup");
                return true;
            }
        }
    }
    false
}

/// Drives the periodic scheduler tick plus the one-time startup
/// missed-backup sweep. Reads run history through `R`; submits due runs
/// through `Q` so they go through the same inflight/channel path as a
/// manually-requested run.
pub struct Scheduler<R, Q> {
    repo: Arc<R>,
    queuer: Arc<Q>,
    poll_interval: std::time::Duration,
}

impl<R: BackupRepository + 'static, Q: RunQueuer + 'static> Scheduler<R, Q> {
    /// Build a scheduler polling at `poll_interval`.
    pub fn new(repo: Arc<R>, queuer: Arc<Q>, poll_interval: std::time::Duration) -> Self {
        Self { repo, queuer, poll_interval }
    }

    /// Run once at startup: queue at most one missed cadence per enabled
    /// instance, using `"startup-recovery"` as the requester.
    pub async fn run_startup_sweep(&self) {
        self.sweep_once("startup-recovery").await;
    }

    /// Spawn the periodic tick loop; exits when `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(self.poll_interval) => {}
                }
                self.sweep_once("scheduler").await;
            }
        })
    }

    async fn sweep_once(&self, requested_by: &str) {
        let now = Utc::now();
        let settings = match self.repo.list_enabled_settings().await {
            Ok(settings) => settings,
            Err(err) => {
                error!(error = %err, "failed to list backup settings for scheduler sweep");
                return;
            }
        };
        for instance_settings in &settings {
            queue_missed_kind(self.repo.as_ref(), self.queuer.as_ref(), instance_settings, requested_by, now).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled_kind: bool) -> BackupSettings {
        BackupSettings {
            instance_id: 1,
            enabled: true,
            hourly_enabled: false,
            daily_enabled: enabled_kind,
            weekly_enabled: false,
            monthly_enabled: false,
            keep_hourly: 1,
            keep_daily: 7,
            keep_weekly: 1,
            keep_monthly: 1,
            include_categories: Vec::new(),
            include_tags: Vec::new(),
        }
    }

    #[test]
    fn disabled_cadence_is_never_missed() {
        let s = settings(false);
        let now = Utc::now();
        assert!(!is_backup_missed(&s, BackupKind::Daily, None, now));
    }

    #[test]
    fn first_run_with_no_history_is_missed() {
        let s = settings(true);
        assert!(is_backup_missed(&s, BackupKind::Daily, None, Utc::now()));
    }

    #[test]
    fn daily_due_exactly_at_interval_boundary() {
        let s = settings(true);
        let last = Utc::now() - ChronoDuration::days(1);
        assert!(is_backup_missed(&s, BackupKind::Daily, Some(last), Utc::now()));
    }

    #[test]
    fn daily_not_due_before_interval_elapses() {
        let s = settings(true);
        let last = Utc::now() - ChronoDuration::hours(1);
        assert!(!is_backup_missed(&s, BackupKind::Daily, Some(last), Utc::now()));
    }

    #[test]
    fn monthly_uses_calendar_months_not_fixed_days() {
        let mut s = settings(false);
        s.monthly_enabled = true;
        let last = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z").unwrap().with_timezone(&Utc);
        let before = DateTime::parse_from_rfc3339("2026-02-10T00:00:00Z").unwrap().with_timezone(&Utc);
        let after = DateTime::parse_from_rfc3339("2026-02-16T00:00:00Z").unwrap().with_timezone(&Utc);
        assert!(!is_backup_missed(&s, BackupKind::Monthly, Some(last), before));
        assert!(is_backup_missed(&s, BackupKind::Monthly, Some(last), after));
    }
}
