//! Persistence seam for the Backup Service, mirroring
//! `fleet_rules::repository::RulesRepository`: a trait so end-to-end
//! executor/scheduler tests can run against an in-memory double instead of a
//! real Postgres instance, with [`fleet_data::DataStore`] as the production
//! implementation.

use async_trait::async_trait;
use fleet_data::model::{BackupItem, BackupKind, BackupRun, BackupSettings, NewBackupRun};
use fleet_data::DataStore;
use serde_json::Value;

use crate::error::BackupResult;

/// What the Backup Service needs from the persistence layer.
#[async_trait]
pub trait BackupRepository: Send + Sync {
    /// Queue a new run row in `Pending` status.
    async fn queue_run(&self, run: &NewBackupRun) -> BackupResult<BackupRun>;
    /// Delete a queued run row (used when a job is cancelled before handoff).
    async fn delete_run(&self, run_id: i64) -> BackupResult<()>;
    /// Transition a run to `Running`.
    async fn mark_run_started(&self, run_id: i64) -> BackupResult<()>;
    /// Transition a run to `Success` with final totals.
    #[allow(clippy::too_many_arguments)]
    async fn mark_run_succeeded(
        &self,
        run_id: i64,
        manifest_path: &str,
        total_bytes: i64,
        torrent_count: i64,
        category_counts: &Value,
        categories: &[String],
        tags: &[String],
    ) -> BackupResult<()>;
    /// Transition a run to `Failed`.
    async fn mark_run_failed(&self, run_id: i64, error_message: &str) -> BackupResult<()>;
    /// Fail every run left `Pending`/`Running` from a prior process lifetime.
    async fn recover_interrupted_runs(&self) -> BackupResult<Vec<BackupRun>>;
    /// Fetch one run by id.
    async fn fetch_run(&self, run_id: i64) -> BackupResult<Option<BackupRun>>;
    /// Runs for an instance/cadence, newest first.
    async fn list_runs(&self, instance_id: i64, kind: BackupKind) -> BackupResult<Vec<BackupRun>>;
    /// The most recent successful run for an instance/cadence, if any.
    async fn last_successful_run(&self, instance_id: i64, kind: BackupKind) -> BackupResult<Option<BackupRun>>;
    /// Whether the instance currently has a run in flight.
    async fn has_inflight_run(&self, instance_id: i64) -> BackupResult<bool>;
    /// Persist the items exported by a completed run.
    async fn insert_items(&self, run_id: i64, items: &[BackupItem]) -> BackupResult<()>;
    /// Items belonging to a run.
    async fn list_items(&self, run_id: i64) -> BackupResult<Vec<BackupItem>>;
    /// Delete runs beyond `keep` for an instance/cadence, returning blob
    /// paths that became unreferenced.
    async fn prune_runs(&self, instance_id: i64, kind: BackupKind, keep: i32) -> BackupResult<Vec<String>>;
    /// Load backup settings for an instance.
    async fn fetch_settings(&self, instance_id: i64) -> BackupResult<Option<BackupSettings>>;
    /// Every instance with backups enabled.
    async fn list_enabled_settings(&self) -> BackupResult<Vec<BackupSettings>>;
    /// Insert or replace an instance's backup settings.
    async fn upsert_settings(&self, settings: &BackupSettings) -> BackupResult<BackupSettings>;
}

#[async_trait]
impl BackupRepository for DataStore {
    async fn queue_run(&self, run: &NewBackupRun) -> BackupResult<BackupRun> {
        Ok(self.queue_run(run).await?)
    }

    async fn delete_run(&self, run_id: i64) -> BackupResult<()> {
        Ok(self.delete_run(run_id).await?)
    }

    async fn mark_run_started(&self, run_id: i64) -> BackupResult<()> {
        Ok(self.mark_run_started(run_id).await?)
    }

    async fn mark_run_succeeded(
        &self,
        run_id: i64,
        manifest_path: &str,
        total_bytes: i64,
        torrent_count: i64,
        category_counts: &Value,
        categories: &[String],
        tags: &[String],
    ) -> BackupResult<()> {
        Ok(self
            .mark_run_succeeded(run_id, manifest_path, total_bytes, torrent_count, category_counts, categories, tags)
            .await?)
    }

    async fn mark_run_failed(&self, run_id: i64, error_message: &str) -> BackupResult<()> {
        Ok(self.mark_run_failed(run_id, error_message).await?)
    }

    async fn recover_interrupted_runs(&self) -> BackupResult<Vec<BackupRun>> {
        Ok(self.recover_interrupted_runs().await?)
    }

    async fn fetch_run(&self, run_id: i64) -> BackupResult<Option<BackupRun>> {
        Ok(self.fetch_run(run_id).await?)
    }

    async fn list_runs(&self, instance_id: i64, kind: BackupKind) -> BackupResult<Vec<BackupRun>> {
        Ok(self.list_runs(instance_id, kind).await?)
    }

    async fn last_successful_run(&self, instance_id: i64, kind: BackupKind) -> BackupResult<Option<BackupRun>> {
        Ok(self.last_successful_run(instance_id, kind).await?)
    }

    async fn has_inflight_run(&self, instance_id: i64) -> BackupResult<bool> {
        Ok(self.has_inflight_run(instance_id).await?)
    }

    async fn insert_items(&self, run_id: i64, items: &[BackupItem]) -> BackupResult<()> {
        Ok(self.insert_items(run_id, items).await?)
    }

    async fn list_items(&self, run_id: i64) -> BackupResult<Vec<BackupItem>> {
        Ok(self.list_items(run_id).await?)
    }

    async fn prune_runs(&self, instance_id: i64, kind: BackupKind, keep: i32) -> BackupResult<Vec<String>> {
        Ok(self.prune_runs(instance_id, kind, keep).await?)
    }

    async fn fetch_settings(&self, instance_id: i64) -> BackupResult<Option<BackupSettings>> {
        Ok(self.fetch_settings(instance_id).await?)
    }

    async fn list_enabled_settings(&self) -> BackupResult<Vec<BackupSettings>> {
        Ok(self.list_enabled_settings().await?)
    }

    async fn upsert_settings(&self, settings: &BackupSettings) -> BackupResult<BackupSettings> {
        Ok(self.upsert_settings(settings).await?)
    }
}
