//! The on-disk manifest format: 2-space indented UTF-8 JSON,
//! one file per run, written alongside the content-addressed blob store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupResult;

/// A category snapshotted into the manifest when `includeCategories` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCategory {
    /// The daemon's configured save path for this category.
    #[serde(rename = "savePath")]
    pub save_path: String,
}

/// One exported torrent recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    /// Torrent hash.
    pub hash: String,
    /// Display name at export time.
    pub name: String,
    /// Category at export time, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Size in bytes.
    pub size_bytes: i64,
    /// Archive-relative filename for the exported `.torrent`.
    pub archive_path: String,
    /// BitTorrent v1 infohash, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infohash_v1: Option<String>,
    /// BitTorrent v2 infohash, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infohash_v2: Option<String>,
    /// Tags at export time, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Content-addressed path to the stored `.torrent` blob, if one was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_blob: Option<String>,
}

/// The complete manifest written for one backup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Instance the run backed up.
    pub instance_id: i64,
    /// Cadence this run represents.
    pub kind: String,
    /// When the manifest was generated.
    pub generated_at: DateTime<Utc>,
    /// Number of torrents exported.
    pub torrent_count: i64,
    /// Per-category save paths, if `includeCategories` was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<HashMap<String, ManifestCategory>>,
    /// Sorted, deduplicated tag list, if `includeTags` was set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Exported torrents, in export order.
    pub items: Vec<ManifestItem>,
}

impl Manifest {
    /// Serialize as 2-space indented JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> BackupResult<String> {
        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(
            &mut buf,
            serde_json::ser::PrettyFormatter::with_indent(b"  "),
        );
        serde::Serialize::serialize(self, &mut serializer)?;
        Ok(String::from_utf8(buf).expect("json serializer only emits valid utf-8"))
    }

    /// Parse a manifest from its on-disk JSON representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid manifest.
    pub fn from_bytes(bytes: &[u8]) -> BackupResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            instance_id: 1,
            kind: "manual".to_string(),
            generated_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            torrent_count: 1,
            categories: None,
            tags: None,
            items: vec![ManifestItem {
                hash: "abc".to_string(),
                name: "Movie".to_string(),
                category: None,
                size_bytes: 100,
                archive_path: "Movie.torrent".to_string(),
                infohash_v1: Some("abc".to_string()),
                infohash_v2: None,
                tags: None,
                torrent_blob: Some("backups/torrents/ab/c/.../abc.torrent".to_string()),
            }],
        }
    }

    #[test]
    fn round_trips_through_json() {
        let manifest = sample();
        let json = manifest.to_pretty_json().unwrap();
        let parsed = Manifest::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn omits_absent_optional_fields() {
        let manifest = sample();
        let json = manifest.to_pretty_json().unwrap();
        assert!(!json.contains("\"category\""));
        assert!(!json.contains("\"infohash2\""));
    }

    #[test]
    fn pretty_json_is_two_space_indented() {
        let json = sample().to_pretty_json().unwrap();
        assert!(json.lines().any(|line| line.starts_with("  \"")));
    }
}
