//! Error type shared by the instance registry and the qBittorrent client.

use thiserror::Error;

/// Errors a qBittorrent client or instance registry collaborator can raise.
#[derive(Debug, Error)]
pub enum QbitError {
    /// The client build does not implement this capability.
    #[error("operation '{operation}' is not supported by this client")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: &'static str,
    },
    /// The underlying HTTP/daemon call failed.
    #[error("operation '{operation}' failed for instance {instance_id}: {source}")]
    RequestFailed {
        /// Name of the operation that failed.
        operation: &'static str,
        /// Instance the call was directed at.
        instance_id: i64,
        /// Underlying transport/daemon error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// No instance with this id is registered, or it is registered but
    /// marked inactive.
    #[error("instance {instance_id} not found or inactive")]
    InstanceNotFound {
        /// The instance id that was looked up.
        instance_id: i64,
    },
}

/// Convenience alias for collaborator call results.
pub type QbitResult<T> = Result<T, QbitError>;
