//! End-to-end `BackupService`/`BackupExecutor` scenarios against in-memory
//! doubles and a temp directory: no Postgres, no qBittorrent daemon.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use fleet_backup::error::BackupResult;
use fleet_backup::repository::BackupRepository;
use fleet_backup::service::BackupService;
use fleet_data::model::{BackupItem, BackupKind, BackupRun, BackupSettings, NewBackupRun, RunStatus};
use fleet_qbit::testing::{InMemoryClientPool, InMemoryInstanceRegistry, RecordingQbitClient};
use fleet_qbit::{ExportedTorrent, Instance, Torrent};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct InMemoryBackupRepository {
    next_id: AtomicI64,
    runs: Mutex<Vec<BackupRun>>,
    items: Mutex<Vec<BackupItem>>,
    settings: Mutex<Vec<BackupSettings>>,
}

impl InMemoryBackupRepository {
    fn with_settings(settings: Vec<BackupSettings>) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            runs: Mutex::new(Vec::new()),
            items: Mutex::new(Vec::new()),
            settings: Mutex::new(settings),
        }
    }

    fn runs_snapshot(&self) -> Vec<BackupRun> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackupRepository for InMemoryBackupRepository {
    async fn queue_run(&self, run: &NewBackupRun) -> BackupResult<BackupRun> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = BackupRun {
            id,
            instance_id: run.instance_id,
            kind: run.kind,
            status: RunStatus::Pending,
            requested_by: run.requested_by.clone(),
            requested_at: run.requested_at,
            started_at: None,
            completed_at: None,
            manifest_path: None,
            total_bytes: 0,
            torrent_count: 0,
            category_counts: Value::Object(serde_json::Map::new()),
            categories: Vec::new(),
            tags: Vec::new(),
            error_message: None,
        };
        self.runs.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn delete_run(&self, run_id: i64) -> BackupResult<()> {
        self.runs.lock().unwrap().retain(|r| r.id != run_id);
        Ok(())
    }

    async fn mark_run_started(&self, run_id: i64) -> BackupResult<()> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == run_id) {
            run.status = RunStatus::Running;
            run.started_at = Some(Utc::now());
        }
        Ok(())
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
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == run_id) {
            run.status = RunStatus::Success;
            run.completed_at = Some(Utc::now());
            run.manifest_path = Some(manifest_path.to_string());
            run.total_bytes = total_bytes;
            run.torrent_count = torrent_count;
            run.category_counts = category_counts.clone();
            run.categories = categories.to_vec();
            run.tags = tags.to_vec();
        }
        Ok(())
    }

    async fn mark_run_failed(&self, run_id: i64, error_message: &str) -> BackupResult<()> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.iter_mut().find(|r| r.id == run_id) {
            run.status = RunStatus::Failed;
            run.completed_at = Some(Utc::now());
            run.error_message = Some(error_message.to_string());
        }
        Ok(())
    }

    async fn recover_interrupted_runs(&self) -> BackupResult<Vec<BackupRun>> {
        let mut runs = self.runs.lock().unwrap();
        let mut recovered = Vec::new();
        for run in runs.iter_mut() {
            if matches!(run.status, RunStatus::Pending | RunStatus::Running) {
                run.status = RunStatus::Failed;
                run.completed_at = Some(Utc::now());
                run.error_message = Some("Backup interrupted by application restart".to_string());
                recovered.push(run.clone());
            }
        }
        Ok(recovered)
    }

    async fn fetch_run(&self, run_id: i64) -> BackupResult<Option<BackupRun>> {
        Ok(self.runs.lock().unwrap().iter().find(|r| r.id == run_id).cloned())
    }

    async fn list_runs(&self, instance_id: i64, kind: BackupKind) -> BackupResult<Vec<BackupRun>> {
        let mut runs: Vec<_> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.instance_id == instance_id && r.kind == kind)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(runs)
    }

    async fn last_successful_run(&self, instance_id: i64, kind: BackupKind) -> BackupResult<Option<BackupRun>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.instance_id == instance_id && r.kind == kind && r.status == RunStatus::Success)
            .max_by_key(|r| r.completed_at)
            .cloned())
    }

    async fn has_inflight_run(&self, instance_id: i64) -> BackupResult<bool> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.instance_id == instance_id && matches!(r.status, RunStatus::Pending | RunStatus::Running)))
    }

    async fn insert_items(&self, _run_id: i64, items: &[BackupItem]) -> BackupResult<()> {
        self.items.lock().unwrap().extend(items.iter().cloned());
        Ok(())
    }

    async fn list_items(&self, run_id: i64) -> BackupResult<Vec<BackupItem>> {
        Ok(self.items.lock().unwrap().iter().filter(|i| i.run_id == run_id).cloned().collect())
    }

    async fn prune_runs(&self, _instance_id: i64, _kind: BackupKind, _keep: i32) -> BackupResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fetch_settings(&self, instance_id: i64) -> BackupResult<Option<BackupSettings>> {
        Ok(self.settings.lock().unwrap().iter().find(|s| s.instance_id == instance_id).cloned())
    }

    async fn list_enabled_settings(&self) -> BackupResult<Vec<BackupSettings>> {
        Ok(self.settings.lock().unwrap().iter().filter(|s| s.enabled).cloned().collect())
    }

    async fn upsert_settings(&self, settings: &BackupSettings) -> BackupResult<BackupSettings> {
        let mut all = self.settings.lock().unwrap();
        all.retain(|s| s.instance_id != settings.instance_id);
        all.push(settings.clone());
        Ok(settings.clone())
    }
}

fn instance() -> Instance {
    Instance {
        id: 1,
        name: "Home Box".to_string(),
        host: "http://localhost:8080".to_string(),
        active: true,
    }
}

fn settings() -> BackupSettings {
    BackupSettings {
        instance_id: 1,
        enabled: true,
        hourly_enabled: true,
        daily_enabled: false,
        weekly_enabled: false,
        monthly_enabled: false,
        keep_hourly: 5,
        keep_daily: 1,
        keep_weekly: 1,
        keep_monthly: 1,
        include_categories: Vec::new(),
        include_tags: Vec::new(),
    }
}

fn torrent(hash: &str) -> Torrent {
    Torrent {
        hash: hash.to_string(),
        infohash_v1: Some(hash.to_string()),
        infohash_v2: None,
        name: format!("Movie {hash}"),
        category: "movies".to_string(),
        tags: "hd,2026".to_string(),
        tracker_url: "https://tracker.example.com/announce".to_string(),
        trackers: vec!["https://tracker.example.com/announce".to_string()],
        size: 1_000,
        ratio: 1.5,
        ratio_limit: 0.0,
        upload_limit_bps: 0,
        download_limit_bps: 0,
        seeding_time_sec: 0,
        seeding_time_limit: 0,
        progress: 1.0,
        content_path: format!("/downloads/{hash}"),
        added_on: Utc::now().timestamp(),
    }
}

fn build_service(
    client: Arc<RecordingQbitClient>,
    data_dir: &std::path::Path,
) -> (Arc<BackupService<InMemoryBackupRepository>>, Arc<InMemoryBackupRepository>) {
    let repo = Arc::new(InMemoryBackupRepository::with_settings(vec![settings()]));
    let registry = Arc::new(InMemoryInstanceRegistry::new(vec![instance()]));
    let pool = Arc::new(InMemoryClientPool::new(vec![(1, client as Arc<dyn fleet_qbit::QbitClient>)]));
    let service = BackupService::new(Arc::clone(&repo), registry, pool, data_dir, 2, Arc::new(fleet_telemetry::Metrics::new()));
    (service, repo)
}

#[tokio::test]
async fn s1_single_writer_per_instance_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(RecordingQbitClient::with_torrents(vec![torrent("a")]));
    client.set_export(
        "a",
        ExportedTorrent {
            bytes: b"d8:announce0:e".to_vec(),
            suggested_name: "Movie a.torrent".to_string(),
            tracker_domain: "tracker.example.com".to_string(),
        },
    );
    let (service, _repo) = build_service(client, dir.path());

    let first = service.queue_run(1, BackupKind::Hourly, "test").await;
    assert!(first.is_ok());
    let second = service.queue_run(1, BackupKind::Hourly, "test").await;
    assert!(second.is_err(), "second concurrent run for the same instance must be rejected");
}

#[tokio::test]
async fn s4_crash_recovery_marks_pending_and_running_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(RecordingQbitClient::with_torrents(Vec::new()));
    let (service, repo) = build_service(client, dir.path());

    repo.queue_run(&NewBackupRun {
        instance_id: 1,
        kind: BackupKind::Hourly,
        requested_by: "scheduler".to_string(),
        requested_at: Utc::now(),
    })
    .await
    .unwrap();
    let running = repo
        .queue_run(&NewBackupRun {
            instance_id: 1,
            kind: BackupKind::Daily,
            requested_by: "scheduler".to_string(),
            requested_at: Utc::now(),
        })
        .await
        .unwrap();
    repo.mark_run_started(running.id).await.unwrap();

    let cancel = CancellationToken::new();
    let handles = service.spawn(cancel.clone()).await.unwrap();
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }

    let runs = repo.runs_snapshot();
    assert!(runs.iter().all(|r| r.status == RunStatus::Failed));
    assert!(runs
        .iter()
        .all(|r| r.error_message.as_deref() == Some("Backup interrupted by application restart")));
}

#[tokio::test]
async fn executor_produces_manifest_and_blob_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(RecordingQbitClient::with_torrents(vec![torrent("deadbeef")]));
    client.set_export(
        "deadbeef",
        ExportedTorrent {
            bytes: b"d8:announce0:e".to_vec(),
            suggested_name: "Movie deadbeef.torrent".to_string(),
            tracker_domain: "tracker.example.com".to_string(),
        },
    );
    let pool = Arc::new(InMemoryClientPool::new(vec![(1, client as Arc<dyn fleet_qbit::QbitClient>)]));
    let executor = fleet_backup::executor::BackupExecutor::new(pool, dir.path());
    let cancel = CancellationToken::new();

    let result = executor
        .execute(1, &instance(), BackupKind::Manual, &settings(), &cancel)
        .await
        .unwrap();

    assert_eq!(result.torrent_count, 1);
    assert_eq!(result.items.len(), 1);
    let manifest_abs = dir.path().join(&result.manifest_path);
    assert!(manifest_abs.exists());
    let blob_rel = result.items[0].torrent_blob_path.as_ref().unwrap();
    assert!(dir.path().join(blob_rel).exists());
}
