//! Instance Registry contract (C1).
//!
//! The registry maps `instanceID → {host, credentials, active}`; credential
//! storage, included, is owned by an admin API outside this core. Only the
//! read surface the core needs is modeled here.

use async_trait::async_trait;

use crate::model::Instance;

/// Read-only view over the fleet's registered instances.
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    /// Look up one instance by id, regardless of its `active` flag.
    async fn get(&self, instance_id: i64) -> Option<Instance>;

    /// List every instance currently marked `active`, in registry order.
    async fn list_active(&self) -> Vec<Instance>;
}
