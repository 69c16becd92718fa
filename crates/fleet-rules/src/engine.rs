//! The periodic scan engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use fleet_config::defaults::{DEBOUNCE_SWEEP_AGE, DEBOUNCE_SWEEP_INTERVAL, SKIP_DELETE_WITHIN};
use fleet_config::RulesConfig;
use fleet_data::model::{DeleteMode, NewActivityEntry, TrackerRule};
use fleet_qbit::{BulkActionKind, ClientPool, InstanceRegistry, QbitClient, Torrent};
use fleet_sync::SyncManager;
use fleet_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batching::{plan_mutations, sub_batches};
use crate::debounce::DebounceMaps;
use crate::deletion::{is_cross_seed, resolve_delete_mode, should_delete_torrent, DeleteReason};
use crate::error::{RulesError, RulesResult};
use crate::repository::RulesRepository;
use crate::selection::select_rule;

/// Per-instance scan deadline; a stalled `get_all_torrents`/`bulk_action`
/// call is logged and skipped rather than blocking the rest of the fleet.
const SCAN_OPERATION_TIMEOUT: Duration = Duration::from_secs(25);

/// Drives one periodic scan per active instance: rule selection, debounce,
/// mutation batching, deletion, cross-seed translation, unregistered
/// handling, and activity recording.
pub struct RulesEngine {
    registry: Arc<dyn InstanceRegistry>,
    pool: Arc<dyn ClientPool>,
    sync: Arc<SyncManager>,
    repo: Arc<dyn RulesRepository>,
    debounce: DebounceMaps,
    config: RulesConfig,
    metrics: Arc<Metrics>,
}

impl RulesEngine {
    /// Construct an engine ready to scan. Spawn [`Self::spawn`] to drive it.
    #[must_use]
    pub fn new(
        registry: Arc<dyn InstanceRegistry>,
        pool: Arc<dyn ClientPool>,
        sync: Arc<SyncManager>,
        repo: Arc<dyn RulesRepository>,
        config: RulesConfig,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            pool,
            sync,
            repo,
            debounce: DebounceMaps::new(),
            config,
            metrics,
        })
    }

    /// Prune activity once on startup, then spawn the scan loop and the
    /// hourly debounce sweep (which prunes again on every tick), both
    /// cancellable.
    pub async fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> (JoinHandle<()>, JoinHandle<()>) {
        if let Err(err) = self.prune_activity().await {
            warn!(error = %err, "startup activity prune failed");
        }
        let scan_handle = tokio::spawn(Arc::clone(self).scan_loop(cancel.clone()));
        let sweep_handle = tokio::spawn(Arc::clone(self).sweep_loop(cancel));
        (scan_handle, sweep_handle)
    }

    async fn scan_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.config.scan_interval) => {}
            }
            self.scan_all_active().await;
        }
    }

    async fn sweep_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(DEBOUNCE_SWEEP_INTERVAL) => {}
            }
            self.debounce.sweep(DEBOUNCE_SWEEP_AGE);
            if let Err(err) = self.prune_activity().await {
                warn!(error = %err, "hourly activity prune failed");
            }
        }
    }

    /// Scan every currently-active instance once, logging but not
    /// propagating a per-instance failure so one bad instance never stalls
    /// the rest of the fleet.
    pub async fn scan_all_active(&self) {
        for instance in self.registry.list_active().await {
            match tokio::time::timeout(SCAN_OPERATION_TIMEOUT, self.scan_instance(instance.id)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(instance_id = instance.id, error = %err, "rule scan failed");
                }
                Err(_) => {
                    warn!(instance_id = instance.id, "rule scan exceeded operation deadline");
                }
            }
        }
    }

    /// Perform exactly one scan tick for `instance_id`.
    pub async fn scan_instance(&self, instance_id: i64) -> RulesResult<()> {
        let client = self
            .pool
            .get(instance_id)
            .await
            .ok_or(RulesError::UnknownInstance { instance_id })?;

        let rules = self.repo.list_enabled_rules(instance_id).await?;
        if rules.is_empty() {
            return Ok(());
        }

        let torrents = self.sync.get_all_torrents(instance_id).await?;

        let matched: Vec<(Torrent, TrackerRule)> = torrents
            .iter()
            .filter_map(|torrent| select_rule(torrent, &rules).map(|rule| (torrent.clone(), rule.clone())))
            .collect();

        let mut queued: HashSet<String> = HashSet::new();
        let mut actions: HashMap<BulkActionKind, Vec<String>> = HashMap::new();
        let mut meta: HashMap<String, (TrackerRule, DeleteReason)> = HashMap::new();

        for (torrent, rule) in &matched {
            if self.debounce.is_delete_debounced(instance_id, &torrent.hash, SKIP_DELETE_WITHIN) {
                continue;
            }
            let Some(reason) = should_delete_torrent(torrent, rule) else {
                continue;
            };
            let mode = rule.delete_mode.unwrap_or(DeleteMode::Delete);
            let action = resolve_delete_mode(mode, is_cross_seed(torrent, &torrents));
            actions.entry(action).or_default().push(torrent.hash.clone());
            meta.insert(torrent.hash.clone(), (rule.clone(), reason));
            queued.insert(torrent.hash.clone());
        }

        let unregistered = self.sync.get_tracker_health_counts(instance_id).await?;
        for hash in &unregistered {
            if queued.contains(hash) {
                continue;
            }
            if self.debounce.is_delete_debounced(instance_id, hash, SKIP_DELETE_WITHIN) {
                continue;
            }
            let Some((torrent, rule)) = matched.iter().find(|(t, _)| &t.hash == hash) else {
                continue;
            };
            if !rule.delete_unregistered {
                continue;
            }
            let Some(mode) = rule.delete_mode.filter(|m| !matches!(m, DeleteMode::None)) else {
                continue;
            };
            let action = resolve_delete_mode(mode, is_cross_seed(torrent, &torrents));
            actions.entry(action).or_default().push(hash.clone());
            meta.insert(hash.clone(), (rule.clone(), DeleteReason::Unregistered));
            queued.insert(hash.clone());
        }

        self.execute_deletions(&client, instance_id, &matched, &actions, &meta)
            .await;

        let limit_candidates: Vec<(Torrent, TrackerRule)> = matched
            .into_iter()
            .filter(|(torrent, _)| !queued.contains(&torrent.hash))
            .filter(|(torrent, _)| {
                !self
                    .debounce
                    .is_apply_debounced(instance_id, &torrent.hash, self.config.skip_within)
            })
            .collect();

        self.execute_mutation_plan(&client, instance_id, &limit_candidates).await;

        Ok(())
    }

    async fn execute_deletions(
        &self,
        client: &Arc<dyn QbitClient>,
        instance_id: i64,
        matched: &[(Torrent, TrackerRule)],
        actions: &HashMap<BulkActionKind, Vec<String>>,
        meta: &HashMap<String, (TrackerRule, DeleteReason)>,
    ) {
        for (action, hashes) in actions {
            for batch in sub_batches(hashes, self.config.max_batch_hashes) {
                match client.bulk_action(&batch, *action).await {
                    Ok(()) => {
                        self.metrics.rules_mutations_total.with_label_values(&["delete"]).inc();
                        for hash in &batch {
                            self.debounce.mark_deleted(instance_id, hash);
                            let (rule, reason) = &meta[hash];
                            let torrent_name = matched
                                .iter()
                                .find(|(t, _)| &t.hash == hash)
                                .map(|(t, _)| t.name.clone());
                            self.record(
                                instance_id,
                                hash,
                                torrent_name,
                                reason.action_label(),
                                Some(rule),
                                "success",
                                reason.reason_text(),
                                None,
                            )
                            .await;
                        }
                    }
                    Err(err) => {
                        for hash in &batch {
                            let (rule, _) = &meta[hash];
                            self.record(
                                instance_id,
                                hash,
                                None,
                                "delete_failed",
                                Some(rule),
                                "failure",
                                &err.to_string(),
                                None,
                            )
                            .await;
                        }
                        warn!(instance_id, error = %err, "bulk delete failed");
                    }
                }
            }
        }
    }

    async fn execute_mutation_plan(
        &self,
        client: &Arc<dyn QbitClient>,
        instance_id: i64,
        candidates: &[(Torrent, TrackerRule)],
    ) {
        let plan = plan_mutations(candidates);

        for (kib, hashes) in &plan.upload {
            for batch in sub_batches(hashes, self.config.max_batch_hashes) {
                let result = client.set_upload_limit(&batch, *kib).await;
                self.finish_limit_batch(instance_id, &batch, candidates, result).await;
            }
        }
        for (kib, hashes) in &plan.download {
            for batch in sub_batches(hashes, self.config.max_batch_hashes) {
                let result = client.set_download_limit(&batch, *kib).await;
                self.finish_limit_batch(instance_id, &batch, candidates, result).await;
            }
        }
        for (key, hashes) in &plan.share {
            for batch in sub_batches(hashes, self.config.max_batch_hashes) {
                let result = client
                    .set_share_limit(&batch, key.ratio_limit(), key.seeding_minutes())
                    .await;
                self.finish_limit_batch(instance_id, &batch, candidates, result).await;
            }
        }
    }

    async fn finish_limit_batch(
        &self,
        instance_id: i64,
        batch: &[String],
        candidates: &[(Torrent, TrackerRule)],
        result: fleet_qbit::QbitResult<()>,
    ) {
        match result {
            Ok(()) => {
                self.metrics.rules_mutations_total.with_label_values(&["limit"]).inc();
                for hash in batch {
                    self.debounce.mark_applied(instance_id, hash);
                }
            }
            Err(err) => {
                for hash in batch {
                    let rule = candidates.iter().find(|(t, _)| &t.hash == hash).map(|(_, r)| r);
                    self.record(
                        instance_id,
                        hash,
                        None,
                        "limit_failed",
                        rule,
                        "failure",
                        &err.to_string(),
                        None,
                    )
                    .await;
                }
                warn!(instance_id, error = %err, "limit mutation failed");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        instance_id: i64,
        hash: &str,
        torrent_name: Option<String>,
        action: &str,
        rule: Option<&TrackerRule>,
        outcome: &str,
        reason: &str,
        details: Option<serde_json::Value>,
    ) {
        let entry = NewActivityEntry {
            instance_id,
            hash: hash.to_string(),
            torrent_name,
            tracker_domain: None,
            action: action.to_string(),
            rule_id: rule.map(|r| r.id),
            rule_name: None,
            outcome: outcome.to_string(),
            reason: reason.to_string(),
            details,
        };
        if let Err(err) = self.repo.record_activity(entry).await {
            warn!(instance_id, hash, error = %err, "failed to record activity");
        }
    }

    /// Prune activity older than the configured retention window.
    pub async fn prune_activity(&self) -> RulesResult<u64> {
        let removed = self.repo.prune_activity(self.config.activity_retention_days).await?;
        if removed > 0 {
            info!(removed, "pruned expired activity entries");
        }
        Ok(removed)
    }
}

