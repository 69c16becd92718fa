//! `executeBackup`: the backup pipeline for one queued run.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_data::model::{BackupItem, BackupKind, BackupSettings};
use fleet_qbit::{ClientPool, Instance, QbitClient};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{BackupError, BackupResult};
use crate::fsops::{blob_relative_path, disambiguate, instance_slug, manifest_filename, safe_segment, sanitize_filename, sha256_hex};
use crate::manifest::{Manifest, ManifestCategory, ManifestItem};

/// Everything `executeBackup` produces, ready for the caller to persist via
/// `mark_run_succeeded`/`insert_items`.
pub struct ExecutionResult {
    /// Manifest path, relative to the configured data directory.
    pub manifest_path: String,
    /// Sum of every exported torrent's size.
    pub total_bytes: i64,
    /// Number of torrents exported.
    pub torrent_count: i64,
    /// Per-category torrent counts, as a JSON object.
    pub category_counts: Value,
    /// Distinct categories observed.
    pub categories: Vec<String>,
    /// Distinct tags observed.
    pub tags: Vec<String>,
    /// Rows ready for `DataStore::insert_items`.
    pub items: Vec<BackupItem>,
}

/// Runs the per-torrent export/blob-dedup/manifest pipeline against one
/// instance's qBittorrent client.
pub struct BackupExecutor {
    pool: Arc<dyn ClientPool>,
    data_dir: PathBuf,
}

impl BackupExecutor {
    /// Build an executor rooted at `data_dir`.
    pub fn new(pool: Arc<dyn ClientPool>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            data_dir: data_dir.into(),
        }
    }

    /// The root data directory backups and blobs are written under.
    #[must_use]
    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    /// Execute one backup run to completion. A torrent export failure aborts
    /// the whole run: no partial
    /// items are returned, matching the caller's "failed run persists
    /// nothing" contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance has no reachable client, if any
    /// torrent export fails, or if a filesystem/manifest operation fails.
    pub async fn execute(
        &self,
        run_id: i64,
        instance: &Instance,
        kind: BackupKind,
        settings: &BackupSettings,
        cancel: &CancellationToken,
    ) -> BackupResult<ExecutionResult> {
        let client = self
            .pool
            .get(instance.id)
            .await
            .ok_or(BackupError::UnknownInstance { instance_id: instance.id })?;

        let slug = instance_slug(&instance.name, instance.id);
        let instance_dir = self.data_dir.join("backups").join(&slug);
        std::fs::create_dir_all(&instance_dir).map_err(|source| BackupError::DataDirUnusable {
            path: instance_dir.display().to_string(),
            source,
        })?;

        let all_torrents = client.get_all_torrents().await?;
        let generated_at = Utc::now();

        let category_filter: HashSet<&str> = settings.include_categories.iter().map(String::as_str).collect();
        let tag_filter: HashSet<&str> = settings.include_tags.iter().map(String::as_str).collect();
        let torrents: Vec<_> = all_torrents
            .into_iter()
            .filter(|t| category_filter.is_empty() || category_filter.contains(t.category.as_str()))
            .filter(|t| {
                tag_filter.is_empty()
                    || t.tags
                        .split(',')
                        .map(str::trim)
                        .any(|tag| tag_filter.contains(tag))
            })
            .collect();

        if torrents.is_empty() {
            let manifest = Manifest {
                instance_id: instance.id,
                kind: kind.as_str().to_string(),
                generated_at,
                torrent_count: 0,
                categories: None,
                tags: None,
                items: Vec::new(),
            };
            let manifest_path = self.write_manifest(&instance_dir, &slug, kind, generated_at, &manifest)?;
            return Ok(ExecutionResult {
                manifest_path,
                total_bytes: 0,
                torrent_count: 0,
                category_counts: Value::Object(serde_json::Map::new()),
                categories: Vec::new(),
                tags: Vec::new(),
                items: Vec::new(),
            });
        }

        let category_snapshot = snapshot_categories(client.as_ref(), &category_filter).await;
        let tag_snapshot = snapshot_tags(client.as_ref(), &tag_filter).await;

        let mut taken_paths: HashSet<String> = HashSet::new();
        let mut manifest_items = Vec::with_capacity(torrents.len());
        let mut backup_items = Vec::with_capacity(torrents.len());
        let mut total_bytes: i64 = 0;
        let mut category_counts: HashMap<String, i64> = HashMap::new();
        let mut seen_categories: HashSet<String> = HashSet::new();

        for torrent in &torrents {
            if cancel.is_cancelled() {
                return Err(BackupError::Io {
                    context: "backup cancelled mid-run".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Interrupted, "cancelled"),
                });
            }

            let exported = client.export_torrent(&torrent.hash).await?;
            let bytes = exported.bytes;

            let mut archive_path = sanitize_filename(&exported.suggested_name, &torrent.hash, &exported.tracker_domain);
            if !torrent.category.is_empty() {
                archive_path = format!("{}/{archive_path}", safe_segment(&torrent.category));
            }
            archive_path = disambiguate(archive_path, &mut taken_paths);

            let digest = sha256_hex(&bytes);
            let blob_rel = blob_relative_path(&digest);
            let blob_abs = self.data_dir.join(&blob_rel);
            if !blob_abs.exists() {
                if let Some(parent) = blob_abs.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| BackupError::Io {
                        context: format!("create blob directory {}", parent.display()),
                        source,
                    })?;
                }
                std::fs::write(&blob_abs, &bytes).map_err(|source| BackupError::Io {
                    context: format!("write blob {}", blob_abs.display()),
                    source,
                })?;
            }

            total_bytes += torrent.size;
            if !torrent.category.is_empty() {
                *category_counts.entry(torrent.category.clone()).or_insert(0) += 1;
                seen_categories.insert(torrent.category.clone());
            }

            let torrent_tags: Vec<String> = torrent
                .tags
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();

            manifest_items.push(ManifestItem {
                hash: torrent.hash.clone(),
                name: torrent.name.clone(),
                category: (!torrent.category.is_empty()).then(|| torrent.category.clone()),
                size_bytes: torrent.size,
                archive_path: archive_path.clone(),
                infohash_v1: torrent.infohash_v1.clone(),
                infohash_v2: torrent.infohash_v2.clone(),
                tags: (!torrent_tags.is_empty()).then(|| torrent_tags.clone()),
                torrent_blob: Some(blob_rel.clone()),
            });

            backup_items.push(BackupItem {
                run_id,
                torrent_hash: torrent.hash.clone(),
                name: torrent.name.clone(),
                size_bytes: torrent.size,
                category: (!torrent.category.is_empty()).then(|| torrent.category.clone()),
                archive_rel_path: Some(archive_path),
                infohash_v1: torrent.infohash_v1.clone(),
                infohash_v2: torrent.infohash_v2.clone(),
                tags_raw: (!torrent.tags.is_empty()).then(|| torrent.tags.clone()),
                torrent_blob_path: Some(blob_rel),
            });
        }

        let mut tags = tag_snapshot;
        tags.sort();
        tags.dedup();

        let manifest = Manifest {
            instance_id: instance.id,
            kind: kind.as_str().to_string(),
            generated_at,
            torrent_count: torrents.len() as i64,
            categories: Some(
                category_snapshot
                    .into_iter()
                    .map(|name| (name, ManifestCategory { save_path: String::new() }))
                    .collect(),
            ),
            tags: Some(tags.clone()),
            items: manifest_items,
        };
        let manifest_path = self.write_manifest(&instance_dir, &slug, kind, generated_at, &manifest)?;

        let mut categories: Vec<String> = seen_categories.into_iter().collect();
        categories.sort();

        let category_counts_json = Value::Object(
            category_counts
                .into_iter()
                .map(|(name, count)| (name, Value::from(count)))
                .collect(),
        );

        Ok(ExecutionResult {
            manifest_path,
            total_bytes,
            torrent_count: torrents.len() as i64,
            category_counts: category_counts_json,
            categories,
            tags,
            items: backup_items,
        })
    }

    fn write_manifest(
        &self,
        instance_dir: &std::path::Path,
        slug: &str,
        kind: BackupKind,
        generated_at: DateTime<Utc>,
        manifest: &Manifest,
    ) -> BackupResult<String> {
        let filename = manifest_filename(slug, kind.as_str(), generated_at);
        let abs_path = instance_dir.join(&filename);
        let json = manifest.to_pretty_json()?;
        std::fs::write(&abs_path, json).map_err(|source| BackupError::Io {
            context: format!("write manifest {}", abs_path.display()),
            source,
        })?;
        Ok(abs_path
            .strip_prefix(&self.data_dir)
            .unwrap_or(&abs_path)
            .to_string_lossy()
            .replace('\\', "/"))
    }
}

async fn snapshot_categories(client: &dyn QbitClient, filter: &HashSet<&str>) -> Vec<String> {
    let names = client.get_categories().await.unwrap_or_else(|err| {
        warn!(error = %err, "failed to snapshot categories for backup");
        Vec::new()
    });
    if filter.is_empty() {
        names
    } else {
        names.into_iter().filter(|name| filter.contains(name.as_str())).collect()
    }
}

async fn snapshot_tags(client: &dyn QbitClient, filter: &HashSet<&str>) -> Vec<String> {
    let mut tags = client.get_tags().await.unwrap_or_else(|err| {
        warn!(error = %err, "failed to snapshot tags for backup");
        Vec::new()
    });
    if !filter.is_empty() {
        tags.retain(|tag| filter.contains(tag.as_str()));
    }
    tags.sort();
    tags.dedup();
    tags
}

