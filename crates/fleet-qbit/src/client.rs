//! qBittorrent Client Pool contract.
//!
//! `QbitClient` models one authenticated connection to a single instance.
//! Every capability method has a default body that returns
//! [`QbitError::Unsupported`]: a concrete client only needs to override the
//! capabilities it actually has, and callers get a uniform error for the
//! rest rather than a panic.

use async_trait::async_trait;

use crate::error::{QbitError, QbitResult};
use crate::model::{BulkActionKind, ExportedTorrent, MainDataSnapshot, Torrent};

/// One authenticated, health-tracked connection to a qBittorrent daemon.
#[async_trait]
pub trait QbitClient: Send + Sync {
    /// Request an incremental main-data sync starting from `last_rid`.
    ///
    /// # Errors
    ///
    /// Returns [`QbitError::RequestFailed`] if the daemon call fails.
    async fn sync_main_data(&self, last_rid: i64) -> QbitResult<MainDataSnapshot> {
        let _ = last_rid;
        Err(QbitError::Unsupported {
            operation: "sync_main_data",
        })
    }

    /// List every torrent known to the daemon, unfiltered.
    async fn get_all_torrents(&self) -> QbitResult<Vec<Torrent>> {
        Err(QbitError::Unsupported {
            operation: "get_all_torrents",
        })
    }

    /// List category names known to the daemon.
    async fn get_categories(&self) -> QbitResult<Vec<String>> {
        Err(QbitError::Unsupported {
            operation: "get_categories",
        })
    }

    /// List tag names known to the daemon.
    async fn get_tags(&self) -> QbitResult<Vec<String>> {
        Err(QbitError::Unsupported {
            operation: "get_tags",
        })
    }

    /// Read the daemon's reported Web API version string.
    async fn get_web_api_version(&self) -> QbitResult<String> {
        Err(QbitError::Unsupported {
            operation: "get_web_api_version",
        })
    }

    /// Export the `.torrent` file bytes for one hash.
    async fn export_torrent(&self, hash: &str) -> QbitResult<ExportedTorrent> {
        let _ = hash;
        Err(QbitError::Unsupported {
            operation: "export_torrent",
        })
    }

    /// Set the upload limit, in KiB/s, for each hash in `hashes`.
    async fn set_upload_limit(&self, hashes: &[String], kib_per_sec: i64) -> QbitResult<()> {
        let _ = (hashes, kib_per_sec);
        Err(QbitError::Unsupported {
            operation: "set_upload_limit",
        })
    }

    /// Set the download limit, in KiB/s, for each hash in `hashes`.
    async fn set_download_limit(&self, hashes: &[String], kib_per_sec: i64) -> QbitResult<()> {
        let _ = (hashes, kib_per_sec);
        Err(QbitError::Unsupported {
            operation: "set_download_limit",
        })
    }

    /// Set the share (ratio/seeding-time) limit for each hash in `hashes`.
    async fn set_share_limit(
        &self,
        hashes: &[String],
        ratio_limit: f64,
        seeding_minutes: i64,
    ) -> QbitResult<()> {
        let _ = (hashes, ratio_limit, seeding_minutes);
        Err(QbitError::Unsupported {
            operation: "set_share_limit",
        })
    }

    /// Apply a bulk action (delete variants) to every hash in `hashes`.
    async fn bulk_action(&self, hashes: &[String], action: BulkActionKind) -> QbitResult<()> {
        let _ = (hashes, action);
        Err(QbitError::Unsupported {
            operation: "bulk_action",
        })
    }
}

/// Authenticated, health-tracked connections keyed by instance id.
#[async_trait]
pub trait ClientPool: Send + Sync {
    /// Borrow the client for `instance_id`, if a healthy connection exists.
    async fn get(&self, instance_id: i64) -> Option<std::sync::Arc<dyn QbitClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient;

    #[async_trait]
    impl QbitClient for StubClient {}

    #[tokio::test]
    async fn default_methods_report_unsupported() {
        let client = StubClient;
        assert!(matches!(
            client.sync_main_data(0).await,
            Err(QbitError::Unsupported { operation: "sync_main_data" })
        ));
        assert!(matches!(
            client.get_all_torrents().await,
            Err(QbitError::Unsupported { operation: "get_all_torrents" })
        ));
        assert!(matches!(
            client.export_torrent("abc").await,
            Err(QbitError::Unsupported { operation: "export_torrent" })
        ));
        assert!(matches!(
            client
                .bulk_action(&["abc".to_string()], BulkActionKind::Delete)
                .await,
            Err(QbitError::Unsupported { operation: "bulk_action" })
        ));
    }
}
