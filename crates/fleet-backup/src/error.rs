//! Error type produced by the Backup Service.

use thiserror::Error;

/// Errors the Backup Service can raise while queueing or executing a run.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The instance already has a run in flight; this is the single-writer
    /// invariant's caller-visible face.
    #[error("instance {instance_id} already has a backup in progress")]
    InstanceBusy {
        /// The instance that rejected the new run.
        instance_id: i64,
    },
    /// No active instance exists under this id.
    #[error("instance {instance_id} not found or inactive")]
    UnknownInstance {
        /// The instance id that was looked up.
        instance_id: i64,
    },
    /// The configured data directory could not be created or is not writable.
    #[error("backup data directory {path} is not usable: {source}")]
    DataDirUnusable {
        /// The configured data directory.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A filesystem operation during execution failed.
    #[error("filesystem operation failed: {context}")]
    Io {
        /// What was being done when the operation failed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The manifest could not be serialized or deserialized.
    #[error("manifest (de)serialization failed")]
    Manifest(#[from] serde_json::Error),
    /// The qBittorrent client collaborator failed or does not support a
    /// required capability.
    #[error(transparent)]
    Qbit(#[from] fleet_qbit::QbitError),
    /// The persistence layer failed.
    #[error(transparent)]
    Data(#[from] fleet_data::DataError),
}

/// Convenience alias for Backup Service results.
pub type BackupResult<T> = Result<T, BackupError>;
