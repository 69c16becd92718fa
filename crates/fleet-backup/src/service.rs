//! `BackupService`: ties the inflight invariant, the bounded job queue, the
//! worker pool, and the scheduler together.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleet_data::model::{BackupKind, NewBackupRun};
use fleet_qbit::{ClientPool, InstanceRegistry};
use fleet_telemetry::Metrics;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{BackupError, BackupResult};
use crate::executor::BackupExecutor;
use crate::manifest::Manifest;
use crate::queue::{InflightSet, Job};
use crate::repository::BackupRepository;
use crate::scheduler::{RunQueuer, Scheduler};

/// Runs the Backup Service: scheduler, bounded worker pool, manual
/// queueing, and manifest import.
pub struct BackupService<R> {
    repo: Arc<R>,
    registry: Arc<dyn InstanceRegistry>,
    pool: Arc<dyn ClientPool>,
    executor: Arc<BackupExecutor>,
    inflight: Arc<InflightSet>,
    sender: mpsc::Sender<Job>,
    receiver: AsyncMutex<Option<mpsc::Receiver<Job>>>,
    worker_count: usize,
    metrics: Arc<Metrics>,
}

impl<R: BackupRepository + 'static> BackupService<R> {
    /// Build a service rooted at `data_dir`, with a job channel sized
    /// `2 * worker_count`.
    #[must_use]
    pub fn new(
        repo: Arc<R>,
        registry: Arc<dyn InstanceRegistry>,
        pool: Arc<dyn ClientPool>,
        data_dir: impl AsRef<Path>,
        worker_count: usize,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(2 * worker_count.max(1));
        Arc::new(Self {
            repo,
            registry,
            pool: Arc::clone(&pool),
            executor: Arc::new(BackupExecutor::new(pool, data_dir.as_ref().to_path_buf())),
            inflight: Arc::new(InflightSet::new()),
            sender,
            receiver: AsyncMutex::new(Some(receiver)),
            worker_count,
            metrics,
        })
    }

    /// Recover interrupted runs, run the startup missed-backup sweep, then
    /// spawn the worker pool and the scheduler tick loop.
    pub async fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> BackupResult<Vec<tokio::task::JoinHandle<()>>> {
        let recovered = self.repo.recover_interrupted_runs().await?;
        for run in &recovered {
            warn!(run_id = run.id, instance_id = run.instance_id, "backup run interrupted by application restart");
        }

        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .expect("BackupService::spawn called more than once");

        let mut handles = Vec::with_capacity(self.worker_count + 1);
        let shared_receiver = Arc::new(AsyncMutex::new(receiver));
        for worker_id in 0..self.worker_count {
            let service = Arc::clone(self);
            let receiver = Arc::clone(&shared_receiver);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                service.worker_loop(worker_id, receiver, cancel).await;
            }));
        }

        let scheduler = Arc::new(Scheduler::new(Arc::clone(&self.repo), Arc::clone(self), fleet_config::defaults::BACKUP_POLL_INTERVAL));
        scheduler.run_startup_sweep().await;
        handles.push(scheduler.spawn(cancel));

        Ok(handles)
    }

    /// Queue a run for `instance_id`/`kind`, enforcing the single-writer
    /// invariant. Cancellation before handoff deletes the pending row.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InstanceBusy`] if the instance already has a
    /// run in flight.
    pub async fn queue_run(&self, instance_id: i64, kind: BackupKind, requested_by: &str) -> BackupResult<i64> {
        self.inflight.try_acquire(instance_id)?;
        let new_run = NewBackupRun {
            instance_id,
            kind,
            requested_by: requested_by.to_string(),
            requested_at: Utc::now(),
        };
        let run = match self.repo.queue_run(&new_run).await {
            Ok(run) => run,
            Err(err) => {
                self.inflight.release(instance_id);
                return Err(err);
            }
        };
        let job = Job { run_id: run.id, instance_id, kind };
        if let Err(send_err) = self.sender.try_send(job) {
            self.inflight.release(instance_id);
            let dropped = send_err.into_inner();
            self.repo.delete_run(dropped.run_id).await?;
            return Err(BackupError::InstanceBusy { instance_id });
        }
        Ok(run.id)
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, receiver: Arc<AsyncMutex<mpsc::Receiver<Job>>>, cancel: CancellationToken) {
        loop {
            let job = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    () = cancel.cancelled() => return,
                    job = receiver.recv() => job,
                }
            };
            let Some(job) = job else { return };
            self.run_job(worker_id, job, &cancel).await;
        }
    }

    async fn run_job(&self, worker_id: usize, job: Job, cancel: &CancellationToken) {
        let started = std::time::Instant::now();
        let result = self.execute_and_persist(&job, cancel).await;
        self.inflight.release(job.instance_id);
        let elapsed = started.elapsed().as_secs_f64();
        let status = if result.is_ok() { "success" } else { "failure" };
        self.metrics.backup_runs_total.with_label_values(&[status]).inc();
        self.metrics
            .backup_duration_seconds
            .with_label_values(&[job.kind.as_str()])
            .observe(elapsed);
        if let Err(err) = result {
            error!(worker_id, run_id = job.run_id, instance_id = job.instance_id, error = %err, "backup run failed");
            let _ = self.repo.mark_run_failed(job.run_id, &err.to_string()).await;
        } else {
            info!(worker_id, run_id = job.run_id, instance_id = job.instance_id, "backup run succeeded");
        }
    }

    async fn execute_and_persist(&self, job: &Job, cancel: &CancellationToken) -> BackupResult<()> {
        self.repo.mark_run_started(job.run_id).await?;

        let instance = self
            .registry
            .get(job.instance_id)
            .await
            .ok_or(BackupError::UnknownInstance { instance_id: job.instance_id })?;
        let settings = self
            .repo
            .fetch_settings(job.instance_id)
            .await?
            .ok_or(BackupError::UnknownInstance { instance_id: job.instance_id })?;

        let result = self.executor.execute(job.run_id, &instance, job.kind, &settings, cancel).await?;

        if !result.items.is_empty() {
            self.repo.insert_items(job.run_id, &result.items).await?;
        }
        self.repo
            .mark_run_succeeded(
                job.run_id,
                &result.manifest_path,
                result.total_bytes,
                result.torrent_count,
                &result.category_counts,
                &result.categories,
                &result.tags,
            )
            .await?;

        self.prune_retention(job.instance_id, job.kind, &settings).await;
        Ok(())
    }

    async fn prune_retention(&self, instance_id: i64, kind: BackupKind, settings: &fleet_data::model::BackupSettings) {
        let keep = settings.keep_for(kind);
        let orphaned = match self.repo.prune_runs(instance_id, kind, keep).await {
            Ok(paths) => paths,
            Err(err) => {
                error!(instance_id, kind = kind.as_str(), error = %err, "retention pruning failed");
                return;
            }
        };
        for rel_path in orphaned {
            let abs_path = self.data_dir_join(&rel_path);
            if let Err(io_err) = std::fs::remove_file(&abs_path) {
                if io_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %abs_path.display(), error = %io_err, "failed to remove pruned backup blob");
                }
            }
        }
    }

    fn data_dir_join(&self, rel_path: &str) -> std::path::PathBuf {
        self.executor.data_dir().join(rel_path)
    }

    /// `ImportManifest`: register a previously-exported manifest as a
    /// `success` run without contacting the daemon, re-exporting only the
    /// torrents whose blob is missing from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is malformed or persistence fails.
    pub async fn import_manifest(&self, instance_id: i64, bytes: &[u8], requested_by: &str) -> BackupResult<i64> {
        let manifest = Manifest::from_bytes(bytes)?;
        let new_run = NewBackupRun {
            instance_id,
            kind: parse_kind(&manifest.kind),
            requested_by: requested_by.to_string(),
            requested_at: manifest.generated_at,
        };
        let run = self.repo.queue_run(&new_run).await?;

        let client = self.pool.get(instance_id).await;
        let data_dir = self.executor.data_dir().to_path_buf();
        let instance_name = self.registry.get(instance_id).await.map_or_else(String::new, |i| i.name);
        let slug = crate::fsops::instance_slug(&instance_name, instance_id);
        let instance_dir = data_dir.join("backups").join(&slug);
        let manifest_path = if std::fs::create_dir_all(&instance_dir).is_ok() {
            let filename = crate::fsops::manifest_filename(&slug, &manifest.kind, manifest.generated_at);
            let abs = instance_dir.join(&filename);
            match std::fs::write(&abs, bytes) {
                Ok(()) => abs.strip_prefix(&data_dir).unwrap_or(&abs).to_string_lossy().replace('\\', "/"),
                Err(err) => {
                    warn!(error = %err, "failed to persist imported manifest to disk");
                    String::new()
                }
            }
        } else {
            String::new()
        };
        let mut items = Vec::with_capacity(manifest.items.len());
        let mut total_bytes: i64 = 0;
        let mut category_counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();

        for item in &manifest.items {
            total_bytes += item.size_bytes;
            if let Some(category) = &item.category {
                *category_counts.entry(category.clone()).or_insert(0) += 1;
            }

            let on_disk = item.torrent_blob.as_ref().filter(|rel| data_dir.join(rel).exists()).cloned();
            let blob_path = if let Some(rel) = on_disk {
                Some(rel)
            } else if let Some(client) = &client {
                match client.export_torrent(&item.hash).await {
                    Ok(exported) => {
                        let digest = crate::fsops::sha256_hex(&exported.bytes);
                        let rel = crate::fsops::blob_relative_path(&digest);
                        let abs = data_dir.join(&rel);
                        if !abs.exists() {
                            if let Some(parent) = abs.parent() {
                                let _ = std::fs::create_dir_all(parent);
                            }
                            let _ = std::fs::write(&abs, &exported.bytes);
                        }
                        Some(rel)
                    }
                    Err(err) => {
                        warn!(hash = %item.hash, error = %err, "failed to re-export torrent during manifest import");
                        None
                    }
                }
            } else {
                None
            };

            items.push(fleet_data::model::BackupItem {
                run_id: run.id,
                torrent_hash: item.hash.clone(),
                name: item.name.clone(),
                size_bytes: item.size_bytes,
                category: item.category.clone(),
                archive_rel_path: Some(item.archive_path.clone()),
                infohash_v1: item.infohash_v1.clone(),
                infohash_v2: item.infohash_v2.clone(),
                tags_raw: item.tags.as_ref().map(|tags| tags.join(",")),
                torrent_blob_path: blob_path,
            });
        }

        if !items.is_empty() {
            self.repo.insert_items(run.id, &items).await?;
        }
        let mut categories: Vec<String> = category_counts.keys().cloned().collect();
        categories.sort();
        let category_counts_json = Value::Object(category_counts.into_iter().map(|(name, count)| (name, Value::from(count))).collect());
        self.repo
            .mark_run_succeeded(
                run.id,
                &manifest_path,
                total_bytes,
                manifest.items.len() as i64,
                &category_counts_json,
                &categories,
                manifest.tags.as_deref().unwrap_or_default(),
            )
            .await?;

        Ok(run.id)
    }
}

#[async_trait]
impl<R: BackupRepository + 'static> RunQueuer for BackupService<R> {
    async fn queue(&self, instance_id: i64, kind: BackupKind, requested_by: &str) -> BackupResult<i64> {
        self.queue_run(instance_id, kind, requested_by).await
    }
}

fn parse_kind(raw: &str) -> BackupKind {
    match raw {
        "hourly" => BackupKind::Hourly,
        "daily" => BackupKind::Daily,
        "weekly" => BackupKind::Weekly,
        "monthly" => BackupKind::Monthly,
        _ => BackupKind::Manual,
    }
}
