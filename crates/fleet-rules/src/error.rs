//! Error type produced by the Tracker Rules Engine.

use thiserror::Error;

/// Errors the Tracker Rules Engine can raise while scanning an instance.
#[derive(Debug, Error)]
pub enum RulesError {
    /// No active instance exists under this id.
    #[error("instance {instance_id} not found or inactive")]
    UnknownInstance {
        /// The instance id that was looked up.
        instance_id: i64,
    },
    /// The Sync Manager's cached snapshot for this instance is unavailable.
    #[error(transparent)]
    Sync(#[from] fleet_sync::SyncError),
    /// The persistence layer failed while reading rules or recording activity.
    #[error(transparent)]
    Data(#[from] fleet_data::DataError),
}

/// Convenience alias for Tracker Rules Engine results.
pub type RulesResult<T> = Result<T, RulesError>;
