//! Error type produced by the Sync Manager.

use thiserror::Error;

/// Errors the Sync Manager can raise.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No cached or live instance exists under this id.
    #[error("instance {instance_id} has no sync state")]
    UnknownInstance {
        /// The instance id that was looked up.
        instance_id: i64,
    },
    /// The underlying daemon call failed.
    #[error("sync failed for instance {instance_id}: {source}")]
    ClientFailure {
        /// Instance the poll was directed at.
        instance_id: i64,
        /// Underlying collaborator error.
        #[source]
        source: fleet_qbit::QbitError,
    },
}

/// Convenience alias for Sync Manager results.
pub type SyncResult<T> = Result<T, SyncError>;
