//! Query and response shapes for `SyncManager::get_torrents_with_filters`.

use std::collections::BTreeMap;

use fleet_qbit::Torrent;
use serde::Serialize;

/// Sort direction for a `TorrentQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Desc
    }
}

/// Arbitrary key/value filter constraints, matched against a torrent's
/// `category` and comma-split `tags` depending on key. Kept as a sorted map
/// (rather than a `HashMap`) so two queries with the same constraints in a
/// different construction order still canonicalize identically for
/// `streamOptionsKey` grouping upstream in the Stream Manager.
pub type TorrentFilters = BTreeMap<String, String>;

/// Server-side sort/filter/page request over one instance's cached snapshot.
#[derive(Debug, Clone)]
pub struct TorrentQuery {
    /// Zero-based page index.
    pub page: u32,
    /// Page size, already validated to `[1, 2000]` by the caller.
    pub limit: u32,
    /// Sort key; recognized values are `"name"`, `"size"`, `"ratio"`,
    /// `"progress"`, `"seeding_time_sec"`, and `"added_on"` (the default).
    /// Unrecognized keys fall back to `"added_on"`.
    pub sort: String,
    /// Sort direction.
    pub order: SortOrder,
    /// Case-insensitive substring match against the torrent name.
    pub search: String,
    /// `category` and `tag` filter constraints.
    pub filters: TorrentFilters,
}

impl Default for TorrentQuery {
    fn default() -> Self {
        Self {
            page: 0,
            limit: 300,
            sort: "added_on".to_string(),
            order: SortOrder::Desc,
            search: String::new(),
            filters: TorrentFilters::new(),
        }
    }
}

/// One page of torrents, plus the snapshot metadata a subscriber's `meta`
/// block is built from.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentResponse {
    /// The page of torrents matching the query, already sorted.
    pub torrents: Vec<Torrent>,
    /// Total count of torrents matching the query before paging.
    pub total: usize,
    /// Running id of the snapshot this response was built from.
    pub rid: i64,
    /// Whether the underlying snapshot's last merge was a full replace.
    pub full_update: bool,
}
