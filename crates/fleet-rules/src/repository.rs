//! Persistence seam for the engine: rule listing and activity recording.
//!
//! Kept as a trait, mirroring `fleet_sync::SyncEventSink`, so end-to-end
//! engine tests can run against an in-memory double instead of a real
//! Postgres instance; [`fleet_data::DataStore`] itself is the production
//! implementation.

use async_trait::async_trait;
use fleet_data::model::{NewActivityEntry, TrackerRule};
use fleet_data::DataStore;

use crate::error::RulesResult;

/// What the engine needs from the persistence layer each scan tick.
#[async_trait]
pub trait RulesRepository: Send + Sync {
    /// List enabled rules for `instance_id`, ordered by priority ascending
    /// then id ascending.
    async fn list_enabled_rules(&self, instance_id: i64) -> RulesResult<Vec<TrackerRule>>;

    /// Record one activity entry.
    async fn record_activity(&self, entry: NewActivityEntry) -> RulesResult<()>;

    /// Prune activity older than `retention_days`, returning the row count removed.
    async fn prune_activity(&self, retention_days: i64) -> RulesResult<u64>;
}

#[async_trait]
impl RulesRepository for DataStore {
    async fn list_enabled_rules(&self, instance_id: i64) -> RulesResult<Vec<TrackerRule>> {
        Ok(self.list_enabled_rules(instance_id).await?)
    }

    async fn record_activity(&self, entry: NewActivityEntry) -> RulesResult<()> {
        self.record_activity(&entry).await?;
        Ok(())
    }

    async fn prune_activity(&self, retention_days: i64) -> RulesResult<u64> {
        Ok(self.prune_activity_older_than(retention_days).await?)
    }
}
