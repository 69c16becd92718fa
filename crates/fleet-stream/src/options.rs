//! `StreamOptions` and subscription-group canonicalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Maximum page size accepted from a stream descriptor.
pub const MAX_LIMIT: u32 = 2_000;
/// Default page size when a descriptor omits `limit`.
pub const DEFAULT_LIMIT: u32 = 300;

/// One subscriber's query over one instance's torrent set. Two subscriptions
/// with an equal [`stream_options_key`] share a [`crate::group::SubscriptionGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    /// Instance this subscription polls.
    pub instance_id: i64,
    /// Zero-based page index.
    #[serde(default)]
    pub page: u32,
    /// Page size; defaults to [`DEFAULT_LIMIT`] when omitted.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Sort key; defaults to `"added_on"`.
    #[serde(default = "default_sort")]
    pub sort: String,
    /// Sort direction; defaults to `"desc"`.
    #[serde(default = "default_order")]
    pub order: String,
    /// Case-insensitive substring search against the torrent name.
    #[serde(default)]
    pub search: String,
    /// `category`/`tag` filter constraints.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_sort() -> String {
    "added_on".to_string()
}

fn default_order() -> String {
    "desc".to_string()
}

impl StreamOptions {
    /// Validate the required shape: `instanceID > 0`,
    /// `limit ∈ [1, MAX_LIMIT]`, `order ∈ {asc, desc}`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidDescriptor`] on the first violation.
    pub fn validate(&self) -> StreamResult<()> {
        if self.instance_id <= 0 {
            return Err(StreamError::InvalidDescriptor {
                reason: "instanceId must be positive".to_string(),
            });
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(StreamError::InvalidDescriptor {
                reason: format!("limit must be in [1, {MAX_LIMIT}]"),
            });
        }
        if self.order != "asc" && self.order != "desc" {
            return Err(StreamError::InvalidDescriptor {
                reason: "order must be 'asc' or 'desc'".to_string(),
            });
        }
        Ok(())
    }

    /// Convert to the Sync Manager's query shape.
    #[must_use]
    pub fn to_torrent_query(&self) -> fleet_sync::TorrentQuery {
        fleet_sync::TorrentQuery {
            page: self.page,
            limit: self.limit,
            sort: self.sort.clone(),
            order: if self.order == "asc" {
                fleet_sync::SortOrder::Asc
            } else {
                fleet_sync::SortOrder::Desc
            },
            search: self.search.clone(),
            filters: self.filters.clone(),
        }
    }
}

/// Canonical grouping key: exact match on every field of [`StreamOptions`],
/// with filters JSON-canonicalized via their `BTreeMap` ordering so
/// insertion order never affects the key.
#[must_use]
pub fn stream_options_key(options: &StreamOptions) -> String {
    serde_json::to_string(options).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(instance_id: i64) -> StreamOptions {
        StreamOptions {
            instance_id,
            page: 0,
            limit: DEFAULT_LIMIT,
            sort: "added_on".to_string(),
            order: "desc".to_string(),
            search: String::new(),
            filters: BTreeMap::new(),
        }
    }

    #[test]
    fn rejects_non_positive_instance_id() {
        assert!(options(0).validate().is_err());
    }

    #[test]
    fn rejects_limit_out_of_range() {
        let mut opts = options(1);
        opts.limit = 0;
        assert!(opts.validate().is_err());
        opts.limit = MAX_LIMIT + 1;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn identical_options_produce_identical_keys_regardless_of_filter_order() {
        let mut a = options(1);
        a.filters.insert("category".to_string(), "movies".to_string());
        a.filters.insert("tag".to_string(), "x264".to_string());

        let mut b = options(1);
        b.filters.insert("tag".to_string(), "x264".to_string());
        b.filters.insert("category".to_string(), "movies".to_string());

        assert_eq!(stream_options_key(&a), stream_options_key(&b));
    }

    #[test]
    fn different_pages_produce_different_keys() {
        let a = options(1);
        let mut b = options(1);
        b.page = 1;
        assert_ne!(stream_options_key(&a), stream_options_key(&b));
    }
}
