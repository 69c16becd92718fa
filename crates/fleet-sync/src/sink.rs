//! Callback contract fired on every poll outcome.

use async_trait::async_trait;

use fleet_qbit::{MainDataSnapshot, QbitError};

/// Registered by the Stream Manager to observe every successful or failed
/// poll, independent of who called `force_sync`.
#[async_trait]
pub trait SyncEventSink: Send + Sync {
    /// Fired after a snapshot has been merged successfully.
    async fn on_main_data(&self, instance_id: i64, snapshot: &MainDataSnapshot);

    /// Fired when a poll fails.
    async fn on_sync_error(&self, instance_id: i64, error: &QbitError);
}
