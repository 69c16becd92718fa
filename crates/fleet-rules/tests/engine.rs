//! End-to-end scans of [`RulesEngine`] against in-memory doubles: no
//! Postgres, no qBittorrent daemon, just the scan algorithm.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fleet_config::RulesConfig;
use fleet_data::model::{DeleteMode, NewActivityEntry, TagMatchMode, TrackerRule};
use fleet_qbit::testing::{InMemoryClientPool, InMemoryInstanceRegistry, RecordedCall, RecordingQbitClient};
use fleet_qbit::{BulkActionKind, Instance, Torrent};
use fleet_rules::error::RulesResult;
use fleet_rules::RulesEngine;
use fleet_rules::RulesRepository;
use fleet_sync::SyncManager;

#[derive(Default)]
struct InMemoryRulesRepository {
    rules: Mutex<Vec<TrackerRule>>,
    activity: Mutex<Vec<NewActivityEntry>>,
}

impl InMemoryRulesRepository {
    fn with_rules(rules: Vec<TrackerRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            activity: Mutex::new(Vec::new()),
        }
    }

    fn recorded(&self) -> Vec<NewActivityEntry> {
        self.activity.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl RulesRepository for InMemoryRulesRepository {
    async fn list_enabled_rules(&self, instance_id: i64) -> RulesResult<Vec<TrackerRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.instance_id == instance_id && r.enabled)
            .cloned()
            .collect())
    }

    async fn record_activity(&self, entry: NewActivityEntry) -> RulesResult<()> {
        self.activity.lock().unwrap().push(entry);
        Ok(())
    }

    async fn prune_activity(&self, _retention_days: i64) -> RulesResult<u64> {
        Ok(0)
    }
}

fn torrent(hash: &str, ratio: f64, content_path: &str) -> Torrent {
    Torrent {
        hash: hash.to_string(),
        infohash_v1: None,
        infohash_v2: None,
        name: format!("torrent-{hash}"),
        category: String::new(),
        tags: String::new(),
        tracker_url: "http://tracker.example.com/announce".to_string(),
        trackers: vec!["http://tracker.example.com/announce".to_string()],
        size: 1_000,
        ratio,
        ratio_limit: 0.0,
        upload_limit_bps: 0,
        download_limit_bps: 0,
        seeding_time_sec: 0,
        seeding_time_limit: 0,
        progress: 1.0,
        content_path: content_path.to_string(),
        added_on: 0,
    }
}

fn rule(pattern: &str, delete_mode: DeleteMode, ratio_limit: f64) -> TrackerRule {
    TrackerRule {
        id: 1,
        instance_id: 1,
        enabled: true,
        tracker_pattern: pattern.to_string(),
        categories: vec![],
        tags: vec![],
        tag_match_mode: TagMatchMode::Any,
        upload_limit_kib: None,
        download_limit_kib: None,
        ratio_limit: Some(ratio_limit),
        seeding_time_limit_minutes: None,
        delete_mode: Some(delete_mode),
        delete_unregistered: false,
        priority: 1,
    }
}

async fn harness(
    torrents: Vec<Torrent>,
    rules: Vec<TrackerRule>,
) -> (Arc<RulesEngine>, Arc<RecordingQbitClient>, Arc<InMemoryRulesRepository>) {
    let client = Arc::new(RecordingQbitClient::with_torrents(torrents));
    let registry = Arc::new(InMemoryInstanceRegistry::new(vec![Instance {
        id: 1,
        name: "test".to_string(),
        host: "http://localhost:8080".to_string(),
        active: true,
    }]));
    let pool = Arc::new(InMemoryClientPool::new(vec![(
        1,
        client.clone() as Arc<dyn fleet_qbit::QbitClient>,
    )]));
    let metrics = Arc::new(fleet_telemetry::Metrics::new());
    let sync = Arc::new(SyncManager::new(pool.clone(), metrics.clone()));
    sync.force_sync(1).await.unwrap();

    let repo = Arc::new(InMemoryRulesRepository::with_rules(rules));
    let engine = RulesEngine::new(registry, pool, sync, repo.clone(), RulesConfig::default(), metrics);
    (engine, client, repo)
}

#[tokio::test]
async fn s1_deletes_torrent_that_crossed_ratio_limit() {
    let (engine, client, repo) = harness(
        vec![torrent("a", 3.0, "/data/a")],
        vec![rule("*", DeleteMode::Delete, 2.0)],
    )
    .await;

    engine.scan_instance(1).await.unwrap();

    let calls = client.recorded_calls();
    assert_eq!(calls, vec![RecordedCall::BulkAction(vec!["a".to_string()], BulkActionKind::Delete)]);

    let activity = repo.recorded();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].action, "deleted_ratio");
    assert_eq!(activity[0].outcome, "success");
    assert_eq!(activity[0].reason, "ratio limit reached");
    assert_eq!(activity[0].hash, "a");
}

#[tokio::test]
async fn s2_preserve_cross_seeds_falls_back_to_delete_for_shared_content_path() {
    let (engine, client, _repo) = harness(
        vec![torrent("a", 1.0, "/data/shared"), torrent("b", 1.0, "/data/shared")],
        vec![rule("*", DeleteMode::DeleteWithFilesPreserveCrossSeeds, 0.1)],
    )
    .await;

    engine.scan_instance(1).await.unwrap();

    let calls = client.recorded_calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        RecordedCall::BulkAction(hashes, action) => {
            let mut sorted = hashes.clone();
            sorted.sort();
            assert_eq!(sorted, vec!["a".to_string(), "b".to_string()]);
            assert_eq!(*action, BulkActionKind::Delete);
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn non_matching_torrent_triggers_no_mutation() {
    let (engine, client, repo) = harness(
        vec![torrent("a", 3.0, "/data/a")],
        vec![rule("internal-only.example.com", DeleteMode::Delete, 2.0)],
    )
    .await;

    engine.scan_instance(1).await.unwrap();

    assert!(client.recorded_calls().is_empty());
    assert!(repo.recorded().is_empty());
}

#[tokio::test]
async fn incomplete_torrent_is_never_a_deletion_candidate() {
    let mut incomplete = torrent("a", 3.0, "/data/a");
    incomplete.progress = 0.5;
    let (engine, client, _repo) = harness(vec![incomplete], vec![rule("*", DeleteMode::Delete, 2.0)]).await;

    engine.scan_instance(1).await.unwrap();

    let calls = client.recorded_calls();
    assert!(
        !calls.iter().any(|call| matches!(call, RecordedCall::BulkAction(_, _))),
        "expected no deletion call, got {calls:?}"
    );
}
