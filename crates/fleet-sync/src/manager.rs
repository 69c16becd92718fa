//! Per-instance snapshot cache and poll driver.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use fleet_qbit::{
    BulkActionKind, ClientPool, ExportedTorrent, MainDataSnapshot, QbitError, Torrent,
};
use fleet_telemetry::Metrics;

use crate::error::{SyncError, SyncResult};
use crate::model::{SortOrder, TorrentQuery, TorrentResponse};
use crate::sink::SyncEventSink;

/// Maintains a live torrent snapshot per instance by polling qBittorrent's
/// incremental sync endpoint through a [`ClientPool`], and serves
/// sorted/filtered/paged views over the cached snapshot without touching the
/// network.
///
/// Merge policy for one poll result: when the client reports `full_update`,
/// the cached snapshot is replaced wholesale; otherwise the new torrents,
/// categories, and tags are merged additively into the existing cache (the
/// daemon's delta protocol only reports what changed). `rid` always advances
/// to the polled value so the next `force_sync` requests the correct delta.
pub struct SyncManager {
    pool: Arc<dyn ClientPool>,
    snapshots: RwLock<HashMap<i64, MainDataSnapshot>>,
    sinks: RwLock<Vec<Arc<dyn SyncEventSink>>>,
    metrics: Arc<Metrics>,
}

impl SyncManager {
    /// Construct a manager with no cached state and no registered sinks.
    #[must_use]
    pub fn new(pool: Arc<dyn ClientPool>, metrics: Arc<Metrics>) -> Self {
        Self {
            pool,
            snapshots: RwLock::new(HashMap::new()),
            sinks: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Register a sink to be notified on every future poll outcome.
    pub async fn register_sink(&self, sink: Arc<dyn SyncEventSink>) {
        self.sinks.write().await.push(sink);
    }

    async fn client_for(&self, instance_id: i64) -> SyncResult<Arc<dyn fleet_qbit::QbitClient>> {
        self.pool
            .get(instance_id)
            .await
            .ok_or(SyncError::UnknownInstance { instance_id })
    }

    /// Perform exactly one poll-merge-dispatch cycle for `instance_id`. This
    /// is the unit of work the Stream Manager's self-rescheduling sync loop
    /// drives.
    pub async fn force_sync(&self, instance_id: i64) -> SyncResult<()> {
        let client = self.client_for(instance_id).await?;
        let last_rid = self
            .snapshots
            .read()
            .await
            .get(&instance_id)
            .map_or(0, |snap| snap.rid);

        match client.sync_main_data(last_rid).await {
            Ok(delta) => {
                let merged = self.merge(instance_id, delta).await;
                let sinks = self.sinks.read().await;
                for sink in sinks.iter() {
                    sink.on_main_data(instance_id, &merged).await;
                }
                self.metrics.sync_polls_total.with_label_values(&["success"]).inc();
                info!(instance_id, rid = merged.rid, "sync poll merged");
                Ok(())
            }
            Err(err) => {
                warn!(instance_id, error = %err, "sync poll failed");
                let sinks = self.sinks.read().await;
                for sink in sinks.iter() {
                    sink.on_sync_error(instance_id, &err).await;
                }
                self.metrics.sync_polls_total.with_label_values(&["failure"]).inc();
                Err(SyncError::ClientFailure {
                    instance_id,
                    source: err,
                })
            }
        }
    }

    async fn merge(&self, instance_id: i64, delta: MainDataSnapshot) -> MainDataSnapshot {
        let mut snapshots = self.snapshots.write().await;
        let merged = match snapshots.remove(&instance_id) {
            Some(mut cached) if !delta.full_update => {
                cached.rid = delta.rid;
                cached.full_update = false;
                cached.torrents.extend(delta.torrents);
                cached.categories.extend(delta.categories);
                for tag in delta.tags {
                    if !cached.tags.contains(&tag) {
                        cached.tags.push(tag);
                    }
                }
                cached
                    .tracker_health
                    .unregistered_set
                    .extend(delta.tracker_health.unregistered_set);
                cached
            }
            _ => delta,
        };
        snapshots.insert(instance_id, merged.clone());
        merged
    }

    /// List every cached torrent for `instance_id`, unfiltered.
    pub async fn get_all_torrents(&self, instance_id: i64) -> SyncResult<Vec<Torrent>> {
        self.snapshots
            .read()
            .await
            .get(&instance_id)
            .map(|snap| snap.torrents.values().cloned().collect())
            .ok_or(SyncError::UnknownInstance { instance_id })
    }

    /// Server-side sort/filter/page over the cached snapshot.
    pub async fn get_torrents_with_filters(
        &self,
        instance_id: i64,
        query: &TorrentQuery,
    ) -> SyncResult<TorrentResponse> {
        let snapshots = self.snapshots.read().await;
        let snapshot = snapshots
            .get(&instance_id)
            .ok_or(SyncError::UnknownInstance { instance_id })?;

        let search = query.search.to_ascii_lowercase();
        let mut matching: Vec<Torrent> = snapshot
            .torrents
            .values()
            .filter(|t| search.is_empty() || t.name.to_ascii_lowercase().contains(&search))
            .filter(|t| matches_filters(t, query))
            .cloned()
            .collect();

        sort_torrents(&mut matching, &query.sort, query.order);

        let total = matching.len();
        let offset = (query.page as usize) * (query.limit as usize);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect();

        Ok(TorrentResponse {
            torrents: page,
            total,
            rid: snapshot.rid,
            full_update: snapshot.full_update,
        })
    }

    /// List category names known to the daemon for `instance_id`.
    pub async fn get_categories(&self, instance_id: i64) -> SyncResult<Vec<String>> {
        self.client_for(instance_id)
            .await?
            .get_categories()
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// List tag names known to the daemon for `instance_id`.
    pub async fn get_tags(&self, instance_id: i64) -> SyncResult<Vec<String>> {
        self.client_for(instance_id)
            .await?
            .get_tags()
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// Read the daemon's reported Web API version for `instance_id`.
    pub async fn get_instance_web_api_version(&self, instance_id: i64) -> SyncResult<String> {
        self.client_for(instance_id)
            .await?
            .get_web_api_version()
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// Export the `.torrent` file bytes for one hash on `instance_id`.
    pub async fn export_torrent(
        &self,
        instance_id: i64,
        hash: &str,
    ) -> SyncResult<ExportedTorrent> {
        self.client_for(instance_id)
            .await?
            .export_torrent(hash)
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// Set the upload limit, in KiB/s, for each hash on `instance_id`.
    pub async fn set_torrent_upload_limit(
        &self,
        instance_id: i64,
        hashes: &[String],
        kib_per_sec: i64,
    ) -> SyncResult<()> {
        self.client_for(instance_id)
            .await?
            .set_upload_limit(hashes, kib_per_sec)
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// Set the download limit, in KiB/s, for each hash on `instance_id`.
    pub async fn set_torrent_download_limit(
        &self,
        instance_id: i64,
        hashes: &[String],
        kib_per_sec: i64,
    ) -> SyncResult<()> {
        self.client_for(instance_id)
            .await?
            .set_download_limit(hashes, kib_per_sec)
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// Set the share (ratio/seeding-time) limit for each hash on `instance_id`.
    pub async fn set_torrent_share_limit(
        &self,
        instance_id: i64,
        hashes: &[String],
        ratio_limit: f64,
        seeding_minutes: i64,
    ) -> SyncResult<()> {
        self.client_for(instance_id)
            .await?
            .set_share_limit(hashes, ratio_limit, seeding_minutes)
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// Apply a bulk action to every hash on `instance_id`.
    pub async fn bulk_action(
        &self,
        instance_id: i64,
        hashes: &[String],
        action: BulkActionKind,
    ) -> SyncResult<()> {
        self.client_for(instance_id)
            .await?
            .bulk_action(hashes, action)
            .await
            .map_err(|source| SyncError::ClientFailure { instance_id, source })
    }

    /// Current unregistered-hash classification for `instance_id`.
    pub async fn get_tracker_health_counts(
        &self,
        instance_id: i64,
    ) -> SyncResult<std::collections::HashSet<String>> {
        self.snapshots
            .read()
            .await
            .get(&instance_id)
            .map(|snap| snap.tracker_health.unregistered_set.clone())
            .ok_or(SyncError::UnknownInstance { instance_id })
    }
}

fn matches_filters(torrent: &Torrent, query: &TorrentQuery) -> bool {
    if let Some(category) = query.filters.get("category")
        && !category.is_empty()
        && !torrent.category.eq_ignore_ascii_case(category)
    {
        return false;
    }
    if let Some(tag) = query.filters.get("tag")
        && !tag.is_empty()
    {
        let tags: Vec<String> = torrent
            .tags
            .split(',')
            .map(|t| t.trim().to_ascii_lowercase())
            .collect();
        if !tags.contains(&tag.to_ascii_lowercase()) {
            return false;
        }
    }
    true
}

fn sort_torrents(torrents: &mut [Torrent], sort: &str, order: SortOrder) {
    torrents.sort_by(|a, b| {
        let ordering = match sort {
            "name" => a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()),
            "size" => a.size.cmp(&b.size),
            "ratio" => a.ratio.partial_cmp(&b.ratio).unwrap_or(Ordering::Equal),
            "progress" => a
                .progress
                .partial_cmp(&b.progress)
                .unwrap_or(Ordering::Equal),
            "seeding_time_sec" => a.seeding_time_sec.cmp(&b.seeding_time_sec),
            _ => a.added_on.cmp(&b.added_on),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_qbit::testing::{InMemoryClientPool, RecordingQbitClient};

    fn torrent(hash: &str, name: &str, category: &str, added_on: i64) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            infohash_v1: None,
            infohash_v2: None,
            name: name.to_string(),
            category: category.to_string(),
            tags: String::new(),
            tracker_url: String::new(),
            trackers: Vec::new(),
            size: 1_000,
            ratio: 1.0,
            ratio_limit: 0.0,
            upload_limit_bps: 0,
            download_limit_bps: 0,
            seeding_time_sec: 0,
            seeding_time_limit: 0,
            progress: 1.0,
            content_path: String::new(),
            added_on,
        }
    }

    fn manager_with_torrents(torrents: Vec<Torrent>) -> SyncManager {
        let client = Arc::new(RecordingQbitClient::with_torrents(torrents));
        let pool = InMemoryClientPool::new(vec![(1, client as Arc<dyn fleet_qbit::QbitClient>)]);
        SyncManager::new(Arc::new(pool), Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn force_sync_populates_cache_and_get_all_torrents() {
        let manager = manager_with_torrents(vec![torrent("a", "Alpha", "movies", 1)]);
        manager.force_sync(1).await.unwrap();
        let all = manager.get_all_torrents(1).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].hash, "a");
    }

    #[tokio::test]
    async fn unknown_instance_is_reported() {
        let manager = manager_with_torrents(vec![]);
        let err = manager.force_sync(99).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownInstance { instance_id: 99 }));
    }

    #[tokio::test]
    async fn filters_and_sorts_by_name_ascending() {
        let manager = manager_with_torrents(vec![
            torrent("b", "Beta", "movies", 2),
            torrent("a", "Alpha", "tv", 1),
        ]);
        manager.force_sync(1).await.unwrap();

        let query = TorrentQuery {
            sort: "name".to_string(),
            order: SortOrder::Asc,
            ..TorrentQuery::default()
        };
        let response = manager.get_torrents_with_filters(1, &query).await.unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.torrents[0].name, "Alpha");
        assert_eq!(response.torrents[1].name, "Beta");
    }

    #[tokio::test]
    async fn category_filter_narrows_results() {
        let manager = manager_with_torrents(vec![
            torrent("a", "Alpha", "movies", 1),
            torrent("b", "Beta", "tv", 2),
        ]);
        manager.force_sync(1).await.unwrap();

        let mut filters = crate::model::TorrentFilters::new();
        filters.insert("category".to_string(), "tv".to_string());
        let query = TorrentQuery {
            filters,
            ..TorrentQuery::default()
        };
        let response = manager.get_torrents_with_filters(1, &query).await.unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.torrents[0].hash, "b");
    }

    #[tokio::test]
    async fn pagination_respects_limit_and_page() {
        let torrents = (0..5)
            .map(|i| torrent(&i.to_string(), &format!("T{i}"), "movies", i))
            .collect();
        let manager = manager_with_torrents(torrents);
        manager.force_sync(1).await.unwrap();

        let query = TorrentQuery {
            sort: "added_on".to_string(),
            order: SortOrder::Asc,
            limit: 2,
            page: 1,
            ..TorrentQuery::default()
        };
        let response = manager.get_torrents_with_filters(1, &query).await.unwrap();
        assert_eq!(response.total, 5);
        assert_eq!(response.torrents.len(), 2);
        assert_eq!(response.torrents[0].name, "T2");
        assert_eq!(response.torrents[1].name, "T3");
    }

    struct RecordingSink {
        main_data_calls: std::sync::Mutex<Vec<i64>>,
        error_calls: std::sync::Mutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl SyncEventSink for RecordingSink {
        async fn on_main_data(&self, instance_id: i64, _snapshot: &MainDataSnapshot) {
            self.main_data_calls.lock().unwrap().push(instance_id);
        }

        async fn on_sync_error(&self, instance_id: i64, _error: &QbitError) {
            self.error_calls.lock().unwrap().push(instance_id);
        }
    }

    #[tokio::test]
    async fn registered_sinks_are_notified_on_success_and_failure() {
        let manager = manager_with_torrents(vec![torrent("a", "Alpha", "movies", 1)]);
        let sink = Arc::new(RecordingSink {
            main_data_calls: std::sync::Mutex::new(Vec::new()),
            error_calls: std::sync::Mutex::new(Vec::new()),
        });
        manager.register_sink(sink.clone()).await;

        manager.force_sync(1).await.unwrap();
        assert_eq!(*sink.main_data_calls.lock().unwrap(), vec![1]);

        let err = manager.force_sync(42).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownInstance { .. }));
        assert!(sink.error_calls.lock().unwrap().is_empty());
    }
}
