//! Error type produced by the Stream Manager.

use thiserror::Error;

/// Errors the Stream Manager can raise while serving `/stream` requests.
#[derive(Debug, Error)]
pub enum StreamError {
    /// One or more stream descriptors failed validation; all-or-nothing, so
    /// no subscription from the batch was registered.
    #[error("invalid stream descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable reason the descriptor was rejected.
        reason: String,
    },
    /// A descriptor referenced an instance the registry doesn't know about.
    #[error("instance {instance_id} not found")]
    InstanceNotFound {
        /// The instance id that was looked up.
        instance_id: i64,
    },
    /// `Shutdown` has already been invoked; new requests are refused.
    #[error("stream manager is shutting down")]
    ShuttingDown,
}

/// Convenience alias for Stream Manager results.
pub type StreamResult<T> = Result<T, StreamError>;
