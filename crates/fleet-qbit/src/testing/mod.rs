//! In-memory collaborator doubles shared by every core crate's test suite.
//!
//! Each call a test cares about is recorded into a `Mutex<Vec<_>>` field so
//! assertions can check exact call shape (hashes passed, action requested,
//! limit applied) rather than only the final state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{ClientPool, QbitClient};
use crate::error::{QbitError, QbitResult};
use crate::model::{BulkActionKind, ExportedTorrent, Instance, MainDataSnapshot, Torrent};
use crate::registry::InstanceRegistry;

/// A fixed-membership instance registry backed by an in-memory map.
#[derive(Default)]
pub struct InMemoryInstanceRegistry {
    instances: HashMap<i64, Instance>,
}

impl InMemoryInstanceRegistry {
    /// Build a registry from an explicit instance list.
    #[must_use]
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances: instances.into_iter().map(|inst| (inst.id, inst)).collect(),
        }
    }
}

#[async_trait]
impl InstanceRegistry for InMemoryInstanceRegistry {
    async fn get(&self, instance_id: i64) -> Option<Instance> {
        self.instances.get(&instance_id).cloned()
    }

    async fn list_active(&self) -> Vec<Instance> {
        self.instances
            .values()
            .filter(|inst| inst.active)
            .cloned()
            .collect()
    }
}

/// One recorded call made against a [`RecordingQbitClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// `bulk_action(hashes, action)`.
    BulkAction(Vec<String>, BulkActionKind),
    /// `set_upload_limit(hashes, kib)`.
    SetUploadLimit(Vec<String>, i64),
    /// `set_download_limit(hashes, kib)`.
    SetDownloadLimit(Vec<String>, i64),
    /// `set_share_limit(hashes, ratio, seeding_minutes)`.
    SetShareLimit(Vec<String>, f64, i64),
    /// `export_torrent(hash)`.
    ExportTorrent(String),
}

/// A scriptable, call-recording [`QbitClient`] double for deterministic
/// tests against the Sync Manager, Tracker Rules Engine, and Backup Service.
#[derive(Default)]
pub struct RecordingQbitClient {
    torrents: Mutex<Vec<Torrent>>,
    snapshots: Mutex<Vec<MainDataSnapshot>>,
    exports: Mutex<HashMap<String, ExportedTorrent>>,
    web_api_version: Mutex<String>,
    /// Calls made against this client, in order.
    pub calls: Mutex<Vec<RecordedCall>>,
    /// When `Some`, every call returns this error instead of succeeding.
    pub fail_with: Mutex<Option<String>>,
}

impl RecordingQbitClient {
    /// Construct a client that serves `torrents` for `get_all_torrents`.
    #[must_use]
    pub fn with_torrents(torrents: Vec<Torrent>) -> Self {
        Self {
            torrents: Mutex::new(torrents),
            web_api_version: Mutex::new("5.0.0".to_string()),
            ..Self::default()
        }
    }

    /// Queue a `sync_main_data` response to be returned on the next call.
    pub fn push_snapshot(&self, snapshot: MainDataSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }

    /// Register the export response returned for `hash`.
    pub fn set_export(&self, hash: &str, exported: ExportedTorrent) {
        self.exports.lock().unwrap().insert(hash.to_string(), exported);
    }

    /// Snapshot the calls recorded so far.
    #[must_use]
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn maybe_fail(&self, operation: &'static str, instance_id: i64) -> QbitResult<()> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(QbitError::RequestFailed {
                operation,
                instance_id,
                source: message.into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl QbitClient for RecordingQbitClient {
    async fn sync_main_data(&self, _last_rid: i64) -> QbitResult<MainDataSnapshot> {
        self.maybe_fail("sync_main_data", 0)?;
        let mut snapshots = self.snapshots.lock().unwrap();
        if let Some(next) = snapshots.pop() {
            return Ok(next);
        }
        let torrents = self.torrents.lock().unwrap();
        Ok(MainDataSnapshot {
            rid: 1,
            full_update: true,
            torrents: torrents.iter().map(|t| (t.hash.clone(), t.clone())).collect(),
            categories: HashMap::new(),
            tags: Vec::new(),
            tracker_health: crate::model::TrackerHealthCounts::default(),
        })
    }

    async fn get_all_torrents(&self) -> QbitResult<Vec<Torrent>> {
        self.maybe_fail("get_all_torrents", 0)?;
        Ok(self.torrents.lock().unwrap().clone())
    }

    async fn get_categories(&self) -> QbitResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_tags(&self) -> QbitResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_web_api_version(&self) -> QbitResult<String> {
        Ok(self.web_api_version.lock().unwrap().clone())
    }

    async fn export_torrent(&self, hash: &str) -> QbitResult<ExportedTorrent> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::ExportTorrent(hash.to_string()));
        self.maybe_fail("export_torrent", 0)?;
        self.exports
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or(QbitError::RequestFailed {
                operation: "export_torrent",
                instance_id: 0,
                source: format!("no export fixture registered for {hash}").into(),
            })
    }

    async fn set_upload_limit(&self, hashes: &[String], kib_per_sec: i64) -> QbitResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::SetUploadLimit(hashes.to_vec(), kib_per_sec));
        self.maybe_fail("set_upload_limit", 0)
    }

    async fn set_download_limit(&self, hashes: &[String], kib_per_sec: i64) -> QbitResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::SetDownloadLimit(hashes.to_vec(), kib_per_sec));
        self.maybe_fail("set_download_limit", 0)
    }

    async fn set_share_limit(
        &self,
        hashes: &[String],
        ratio_limit: f64,
        seeding_minutes: i64,
    ) -> QbitResult<()> {
        self.calls.lock().unwrap().push(RecordedCall::SetShareLimit(
            hashes.to_vec(),
            ratio_limit,
            seeding_minutes,
        ));
        self.maybe_fail("set_share_limit", 0)
    }

    async fn bulk_action(&self, hashes: &[String], action: BulkActionKind) -> QbitResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::BulkAction(hashes.to_vec(), action));
        self.maybe_fail("bulk_action", 0)
    }
}

/// A client pool backed by an in-memory map of `instance_id -> client`.
#[derive(Default)]
pub struct InMemoryClientPool {
    clients: HashMap<i64, Arc<dyn QbitClient>>,
}

impl InMemoryClientPool {
    /// Build a pool from explicit `(instance_id, client)` pairs.
    #[must_use]
    pub fn new(clients: Vec<(i64, Arc<dyn QbitClient>)>) -> Self {
        Self {
            clients: clients.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ClientPool for InMemoryClientPool {
    async fn get(&self, instance_id: i64) -> Option<Arc<dyn QbitClient>> {
        self.clients.get(&instance_id).cloned()
    }
}
