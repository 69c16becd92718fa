//! `DataStore`: the single Postgres-backed handle shared by the Tracker
//! Rules Engine and the Backup Service.

use serde_json::Value;
use sqlx::PgPool;

use crate::error::{DataError, DataResult};
use crate::model::{
    ActivityEntry, BackupItem, BackupKind, BackupRun, BackupSettings, DeleteMode,
    NewActivityEntry, NewBackupRun, NewTrackerRule, RunStatus, TrackerRule,
};

/// Database-backed repository for tracker rules, activity, and backups.
#[derive(Clone)]
pub struct DataStore {
    pool: PgPool,
}

impl DataStore {
    /// Open the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> DataResult<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---- Tracker rules -------------------------------------------------

    /// Enabled rules for `instance_id`, in evaluation order: `priority` then
    /// `id` ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_enabled_rules(&self, instance_id: i64) -> DataResult<Vec<TrackerRule>> {
        sqlx::query_as::<_, TrackerRule>(
            "SELECT * FROM tracker_rules WHERE instance_id = $1 AND enabled ORDER BY priority ASC, id ASC",
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::query("list enabled tracker rules"))
    }

    /// Every rule for `instance_id`, enabled or not, in the same order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_rules(&self, instance_id: i64) -> DataResult<Vec<TrackerRule>> {
        sqlx::query_as::<_, TrackerRule>(
            "SELECT * FROM tracker_rules WHERE instance_id = $1 ORDER BY priority ASC, id ASC",
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::query("list tracker rules"))
    }

    /// Insert a new tracker rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_rule(&self, rule: &NewTrackerRule) -> DataResult<TrackerRule> {
        sqlx::query_as::<_, TrackerRule>(
            "INSERT INTO tracker_rules (
                instance_id, enabled, tracker_pattern, categories, tags, tag_match_mode,
                upload_limit_kib, download_limit_kib, ratio_limit, seeding_time_limit_minutes,
                delete_mode, delete_unregistered, priority
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *",
        )
        .bind(rule.instance_id)
        .bind(rule.enabled)
        .bind(&rule.tracker_pattern)
        .bind(&rule.categories)
        .bind(&rule.tags)
        .bind(rule.tag_match_mode.as_str())
        .bind(rule.upload_limit_kib)
        .bind(rule.download_limit_kib)
        .bind(rule.ratio_limit)
        .bind(rule.seeding_time_limit_minutes)
        .bind(rule.delete_mode.map(DeleteMode::as_str))
        .bind(rule.delete_unregistered)
        .bind(rule.priority)
        .fetch_one(&self.pool)
        .await
        .map_err(DataError::query("insert tracker rule"))
    }

    /// Replace every mutable field of rule `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_rule(&self, id: i64, rule: &NewTrackerRule) -> DataResult<Option<TrackerRule>> {
        sqlx::query_as::<_, TrackerRule>(
            "UPDATE tracker_rules SET
                instance_id = $2, enabled = $3, tracker_pattern = $4, categories = $5, tags = $6,
                tag_match_mode = $7, upload_limit_kib = $8, download_limit_kib = $9,
                ratio_limit = $10, seeding_time_limit_minutes = $11, delete_mode = $12,
                delete_unregistered = $13, priority = $14, updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(rule.instance_id)
        .bind(rule.enabled)
        .bind(&rule.tracker_pattern)
        .bind(&rule.categories)
        .bind(&rule.tags)
        .bind(rule.tag_match_mode.as_str())
        .bind(rule.upload_limit_kib)
        .bind(rule.download_limit_kib)
        .bind(rule.ratio_limit)
        .bind(rule.seeding_time_limit_minutes)
        .bind(rule.delete_mode.map(DeleteMode::as_str))
        .bind(rule.delete_unregistered)
        .bind(rule.priority)
        .fetch_optional(&self.pool)
        .await
        .map_err(DataError::query("update tracker rule"))
    }

    /// Delete a rule. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_rule(&self, id: i64) -> DataResult<bool> {
        let result = sqlx::query("DELETE FROM tracker_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DataError::query("delete tracker rule"))?;
        Ok(result.rows_affected() > 0)
    }

    // ---- Activity --------------------------------------------------------

    /// Record one rule-engine decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn record_activity(&self, entry: &NewActivityEntry) -> DataResult<ActivityEntry> {
        sqlx::query_as::<_, ActivityEntry>(
            "INSERT INTO activity_entries (
                instance_id, hash, torrent_name, tracker_domain, action, rule_id, rule_name,
                outcome, reason, details
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *",
        )
        .bind(entry.instance_id)
        .bind(&entry.hash)
        .bind(&entry.torrent_name)
        .bind(&entry.tracker_domain)
        .bind(&entry.action)
        .bind(entry.rule_id)
        .bind(&entry.rule_name)
        .bind(&entry.outcome)
        .bind(&entry.reason)
        .bind(&entry.details)
        .fetch_one(&self.pool)
        .await
        .map_err(DataError::query("record activity entry"))
    }

    /// Most recent activity for an instance, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_recent_activity(&self, instance_id: i64, limit: i64) -> DataResult<Vec<ActivityEntry>> {
        sqlx::query_as::<_, ActivityEntry>(
            "SELECT * FROM activity_entries WHERE instance_id = $1 ORDER BY recorded_at DESC LIMIT $2",
        )
        .bind(instance_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::query("list recent activity"))
    }

    /// Delete activity rows older than `retention_days`. Re-running on an
    /// already-pruned instance deletes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn prune_activity_older_than(&self, retention_days: i64) -> DataResult<u64> {
        let result = sqlx::query(
            "DELETE FROM activity_entries WHERE recorded_at < now() - make_interval(days => $1)",
        )
        .bind(retention_days)
        .execute(&self.pool)
        .await
        .map_err(DataError::query("prune activity"))?;
        Ok(result.rows_affected())
    }

    // ---- Backup runs -------------------------------------------------------

    /// Queue a new run in `Pending` status.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn queue_run(&self, run: &NewBackupRun) -> DataResult<BackupRun> {
        sqlx::query_as::<_, BackupRun>(
            "INSERT INTO backup_runs (
                instance_id, kind, status, requested_by, requested_at, total_bytes, torrent_count,
                category_counts, categories, tags
            ) VALUES ($1, $2, $3, $4, $5, 0, 0, '{}'::jsonb, '{}', '{}')
            RETURNING *",
        )
        .bind(run.instance_id)
        .bind(run.kind.as_str())
        .bind(RunStatus::Pending.as_str())
        .bind(&run.requested_by)
        .bind(run.requested_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DataError::query("queue backup run"))
    }

    /// Delete a run row outright, used when a job is cancelled before it
    /// reaches a worker: the run row is deleted and the inflight slot
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_run(&self, run_id: i64) -> DataResult<()> {
        sqlx::query("DELETE FROM backup_runs WHERE id = $1")
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(DataError::query("delete backup run"))?;
        Ok(())
    }

    /// Transition a run to `Running`, stamping `started_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_run_started(&self, run_id: i64) -> DataResult<()> {
        sqlx::query("UPDATE backup_runs SET status = $2, started_at = now() WHERE id = $1")
            .bind(run_id)
            .bind(RunStatus::Running.as_str())
            .execute(&self.pool)
            .await
            .map_err(DataError::query("mark backup run started"))?;
        Ok(())
    }

    /// Transition a run to `Success`, recording final totals and manifest path.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_run_succeeded(
        &self,
        run_id: i64,
        manifest_path: &str,
        total_bytes: i64,
        torrent_count: i64,
        category_counts: &Value,
        categories: &[String],
        tags: &[String],
    ) -> DataResult<()> {
        sqlx::query(
            "UPDATE backup_runs SET
                status = $2, completed_at = now(), manifest_path = $3, total_bytes = $4,
                torrent_count = $5, category_counts = $6, categories = $7, tags = $8
             WHERE id = $1",
        )
        .bind(run_id)
        .bind(RunStatus::Success.as_str())
        .bind(manifest_path)
        .bind(total_bytes)
        .bind(torrent_count)
        .bind(category_counts)
        .bind(categories)
        .bind(tags)
        .execute(&self.pool)
        .await
        .map_err(DataError::query("mark backup run succeeded"))?;
        Ok(())
    }

    /// Transition a run to `Failed` with `error_message`. A failed run
    /// retains no partial items; callers must not have persisted any before
    /// calling this.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_run_failed(&self, run_id: i64, error_message: &str) -> DataResult<()> {
        sqlx::query(
            "UPDATE backup_runs SET status = $2, completed_at = now(), error_message = $3 WHERE id = $1",
        )
        .bind(run_id)
        .bind(RunStatus::Failed.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(DataError::query("mark backup run failed"))?;
        Ok(())
    }

    /// Fail every run left `Pending` or `Running` from a prior process
    /// lifetime, in one pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn recover_interrupted_runs(&self) -> DataResult<Vec<BackupRun>> {
        sqlx::query_as::<_, BackupRun>(
            "UPDATE backup_runs SET status = 'failed', completed_at = now(),
                error_message = 'Backup interrupted by application restart'
             WHERE status IN ('pending', 'running')
             RETURNING *",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::query("recover interrupted backup runs"))
    }

    /// Fetch a single run by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn fetch_run(&self, run_id: i64) -> DataResult<Option<BackupRun>> {
        sqlx::query_as::<_, BackupRun>("SELECT * FROM backup_runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::query("fetch backup run"))
    }

    /// Runs for an instance and cadence, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_runs(&self, instance_id: i64, kind: BackupKind) -> DataResult<Vec<BackupRun>> {
        sqlx::query_as::<_, BackupRun>(
            "SELECT * FROM backup_runs WHERE instance_id = $1 AND kind = $2 ORDER BY requested_at DESC",
        )
        .bind(instance_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::query("list backup runs"))
    }

    /// The most recent successful run for an instance and cadence, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn last_successful_run(&self, instance_id: i64, kind: BackupKind) -> DataResult<Option<BackupRun>> {
        sqlx::query_as::<_, BackupRun>(
            "SELECT * FROM backup_runs
             WHERE instance_id = $1 AND kind = $2 AND status = 'success'
             ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(instance_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DataError::query("fetch last successful backup run"))
    }

    /// Whether an instance currently has a `Pending` or `Running` run,
    /// mirroring the in-memory `inflight` set's persisted counterpart.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn has_inflight_run(&self, instance_id: i64) -> DataResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM backup_runs WHERE instance_id = $1 AND status IN ('pending', 'running')",
        )
        .bind(instance_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DataError::query("check inflight backup run"))?;
        Ok(count > 0)
    }

    // ---- Backup items -------------------------------------------------------

    /// Insert items for a completed run, chunked at 1000 rows per statement
    /// to stay under Postgres's bind-parameter limit on large backups.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk's insert fails.
    pub async fn insert_items(&self, run_id: i64, items: &[BackupItem]) -> DataResult<()> {
        for chunk in items.chunks(1000) {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(DataError::query("begin backup item insert"))?;
            for item in chunk {
                sqlx::query(
                    "INSERT INTO backup_items (
                        run_id, torrent_hash, name, size_bytes, category, archive_rel_path,
                        infohash_v1, infohash_v2, tags_raw, torrent_blob_path
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(run_id)
                .bind(&item.torrent_hash)
                .bind(&item.name)
                .bind(item.size_bytes)
                .bind(&item.category)
                .bind(&item.archive_rel_path)
                .bind(&item.infohash_v1)
                .bind(&item.infohash_v2)
                .bind(&item.tags_raw)
                .bind(&item.torrent_blob_path)
                .execute(&mut *tx)
                .await
                .map_err(DataError::query("insert backup item"))?;
            }
            tx.commit()
                .await
                .map_err(DataError::query("commit backup item insert"))?;
        }
        Ok(())
    }

    /// Items belonging to a run, in insertion order (a round-trip
    /// property).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_items(&self, run_id: i64) -> DataResult<Vec<BackupItem>> {
        sqlx::query_as::<_, BackupItem>(
            "SELECT * FROM backup_items WHERE run_id = $1 ORDER BY torrent_hash",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::query("list backup items"))
    }

    /// Number of `BackupItem` rows referencing `blob_path` (the blob
    /// refcount invariant).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_blob_references(&self, blob_path: &str) -> DataResult<i64> {
        sqlx::query_scalar("SELECT count(*) FROM backup_items WHERE torrent_blob_path = $1")
            .bind(blob_path)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::query("count blob references"))
    }

    /// Delete every successful run for `instance_id`/`kind` beyond the most
    /// recent `keep`, and return the blob paths that become unreferenced as
    /// a result (quantified invariant 4: a blob is reported only once its
    /// refcount has reached zero, checked inside the same transaction as
    /// the deletion).
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn prune_runs(&self, instance_id: i64, kind: BackupKind, keep: i32) -> DataResult<Vec<String>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DataError::query("begin retention prune"))?;

        let excess_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM backup_runs
             WHERE instance_id = $1 AND kind = $2 AND status = 'success'
             ORDER BY completed_at DESC
             OFFSET $3",
        )
        .bind(instance_id)
        .bind(kind.as_str())
        .bind(i64::from(keep.max(0)))
        .fetch_all(&mut *tx)
        .await
        .map_err(DataError::query("select excess backup runs"))?;

        if excess_ids.is_empty() {
            tx.commit()
                .await
                .map_err(DataError::query("commit empty retention prune"))?;
            return Ok(Vec::new());
        }

        let candidate_blobs: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT torrent_blob_path FROM backup_items
             WHERE run_id = ANY($1) AND torrent_blob_path IS NOT NULL",
        )
        .bind(&excess_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(DataError::query("select candidate blob paths"))?;

        sqlx::query("DELETE FROM backup_runs WHERE id = ANY($1)")
            .bind(&excess_ids)
            .execute(&mut *tx)
            .await
            .map_err(DataError::query("delete excess backup runs"))?;

        let mut orphaned = Vec::with_capacity(candidate_blobs.len());
        for blob in candidate_blobs {
            let count: i64 = sqlx::query_scalar("SELECT count(*) FROM backup_items WHERE torrent_blob_path = $1")
                .bind(&blob)
                .fetch_one(&mut *tx)
                .await
                .map_err(DataError::query("recheck blob reference during prune"))?;
            if count == 0 {
                orphaned.push(blob);
            }
        }

        tx.commit()
            .await
            .map_err(DataError::query("commit retention prune"))?;
        Ok(orphaned)
    }

    // ---- Backup settings ----------------------------------------------------

    /// Load backup settings for an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn fetch_settings(&self, instance_id: i64) -> DataResult<Option<BackupSettings>> {
        sqlx::query_as::<_, BackupSettings>("SELECT * FROM backup_settings WHERE instance_id = $1")
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::query("fetch backup settings"))
    }

    /// Every instance with the master `enabled` switch on, for the
    /// scheduler's per-tick sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_enabled_settings(&self) -> DataResult<Vec<BackupSettings>> {
        sqlx::query_as::<_, BackupSettings>("SELECT * FROM backup_settings WHERE enabled ORDER BY instance_id")
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::query("list enabled backup settings"))
    }

    /// Insert or replace the settings row for an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert_settings(&self, settings: &BackupSettings) -> DataResult<BackupSettings> {
        sqlx::query_as::<_, BackupSettings>(
            "INSERT INTO backup_settings (
                instance_id, enabled, hourly_enabled, daily_enabled, weekly_enabled, monthly_enabled,
                keep_hourly, keep_daily, keep_weekly, keep_monthly, include_categories, include_tags
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (instance_id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                hourly_enabled = EXCLUDED.hourly_enabled,
                daily_enabled = EXCLUDED.daily_enabled,
                weekly_enabled = EXCLUDED.weekly_enabled,
                monthly_enabled = EXCLUDED.monthly_enabled,
                keep_hourly = EXCLUDED.keep_hourly,
                keep_daily = EXCLUDED.keep_daily,
                keep_weekly = EXCLUDED.keep_weekly,
                keep_monthly = EXCLUDED.keep_monthly,
                include_categories = EXCLUDED.include_categories,
                include_tags = EXCLUDED.include_tags
            RETURNING *",
        )
        .bind(settings.instance_id)
        .bind(settings.enabled)
        .bind(settings.hourly_enabled)
        .bind(settings.daily_enabled)
        .bind(settings.weekly_enabled)
        .bind(settings.monthly_enabled)
        .bind(settings.keep_hourly)
        .bind(settings.keep_daily)
        .bind(settings.keep_weekly)
        .bind(settings.keep_monthly)
        .bind(&settings.include_categories)
        .bind(&settings.include_tags)
        .fetch_one(&self.pool)
        .await
        .map_err(DataError::query("upsert backup settings"))
    }
}
