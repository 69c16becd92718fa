//! Value types shared across collaborator boundaries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One managed qBittorrent daemon (C1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Stable identifier.
    pub id: i64,
    /// Human-readable name, used to derive backup directory slugs.
    pub name: String,
    /// Daemon host/base URL.
    pub host: String,
    /// Whether the instance currently participates in polling/automation.
    pub active: bool,
}

/// An observed torrent as reported by qBittorrent. Treated as immutable
/// per snapshot — the fields themselves are never mutated in place; a
/// changed torrent is a new value replacing the old one in the snapshot map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Torrent {
    /// v1 info hash (or daemon-assigned hash) used as the primary key.
    pub hash: String,
    /// BitTorrent v1 info hash, when known separately from `hash`.
    pub infohash_v1: Option<String>,
    /// BitTorrent v2 info hash, when the torrent is a hybrid/v2 torrent.
    pub infohash_v2: Option<String>,
    /// Display name.
    pub name: String,
    /// Assigned category, empty string if none.
    pub category: String,
    /// Comma-separated tag list, as reported by the daemon.
    pub tags: String,
    /// Primary tracker announce URL.
    pub tracker_url: String,
    /// All tracker announce URLs known for this torrent.
    pub trackers: Vec<String>,
    /// Total size in bytes.
    pub size: i64,
    /// Current share ratio.
    pub ratio: f64,
    /// Per-torrent ratio limit, if any (`<=0` means "no limit" upstream).
    pub ratio_limit: f64,
    /// Current upload limit in bytes/second (`0` = unlimited).
    pub upload_limit_bps: i64,
    /// Current download limit in bytes/second (`0` = unlimited).
    pub download_limit_bps: i64,
    /// Total seconds the torrent has spent seeding.
    pub seeding_time_sec: i64,
    /// Per-torrent seeding time limit in minutes (`<=0` means "no limit").
    pub seeding_time_limit: i64,
    /// Completion fraction in `[0.0, 1.0]`.
    pub progress: f64,
    /// On-disk save path for the torrent's content.
    pub content_path: String,
    /// Unix timestamp (seconds) the torrent was added, as reported by the daemon.
    pub added_on: i64,
}

/// The cached, incrementally-updated view of one instance's torrent set
///.
#[derive(Debug, Clone, Default)]
pub struct MainDataSnapshot {
    /// Running id of the last merged update; monotonic per daemon session.
    pub rid: i64,
    /// Whether the last merge was a full replace rather than a delta.
    pub full_update: bool,
    /// Torrents keyed by hash.
    pub torrents: HashMap<String, Torrent>,
    /// Category name to save-path mapping.
    pub categories: HashMap<String, String>,
    /// All known tags, unsorted as received from the daemon.
    pub tags: Vec<String>,
    /// Hashes the daemon currently classifies as unregistered.
    pub tracker_health: TrackerHealthCounts,
}

/// Tracker-health classification for one instance.
#[derive(Debug, Clone, Default)]
pub struct TrackerHealthCounts {
    /// Hashes the tracker has rejected ("unregistered torrent" status).
    pub unregistered_set: std::collections::HashSet<String>,
}

/// Bulk mutation kinds the daemon accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkActionKind {
    /// Remove the torrent entry, keep downloaded files.
    Delete,
    /// Remove the torrent entry and its downloaded files.
    DeleteWithFiles,
}

impl BulkActionKind {
    /// Render the wire name used by the daemon's bulk-action API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::DeleteWithFiles => "deleteWithFiles",
        }
    }
}

/// Result of exporting a `.torrent` file for backup or cross-seed purposes
///.
#[derive(Debug, Clone)]
pub struct ExportedTorrent {
    /// Raw bencoded `.torrent` file contents.
    pub bytes: Vec<u8>,
    /// Filename suggested by the daemon.
    pub suggested_name: String,
    /// Primary tracker's registrable domain, used for filename disambiguation.
    pub tracker_domain: String,
}
