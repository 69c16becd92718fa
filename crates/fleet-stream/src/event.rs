//! SSE payload shapes.

use chrono::{DateTime, Utc};
use fleet_sync::TorrentResponse;
use serde::Serialize;

/// Metadata carried on every event, personalized per subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Instance this event concerns.
    pub instance_id: i64,
    /// Running id of the snapshot the payload was built from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<i64>,
    /// Whether the underlying snapshot's last merge was a full replace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_update: Option<bool>,
    /// Wall-clock time the event was built.
    pub timestamp: DateTime<Utc>,
    /// Backoff hint attached to `stream-error` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_seconds: Option<u64>,
    /// The subscriber's own client key, so multiplexed streams can route
    /// events to the right UI panel.
    pub stream_key: String,
}

impl EventMeta {
    /// Build metadata with every optional field empty but `timestamp` set
    /// to `now` and `stream_key` copied from the subscriber.
    #[must_use]
    pub fn new(instance_id: i64, stream_key: &str) -> Self {
        Self {
            instance_id,
            rid: None,
            full_update: None,
            timestamp: Utc::now(),
            retry_in_seconds: None,
            stream_key: stream_key.to_string(),
        }
    }
}

/// One SSE payload, matching the `{type, data?, meta, error?}` wire shape.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Initial snapshot delivered right after a subscription becomes active.
    Init {
        /// Torrent page plus snapshot metadata.
        data: TorrentResponse,
        /// Event metadata.
        meta: EventMeta,
    },
    /// A change delivered after the initial snapshot.
    Update {
        /// Torrent page plus snapshot metadata.
        data: TorrentResponse,
        /// Event metadata.
        meta: EventMeta,
    },
    /// Keepalive, sent every 5s per instance regardless of activity.
    Heartbeat {
        /// Event metadata (no `data`/`error`).
        meta: EventMeta,
    },
    /// A transient failure building the payload, with a retry hint.
    StreamError {
        /// Event metadata, including `retryInSeconds` when known.
        meta: EventMeta,
        /// Human-readable failure reason.
        error: String,
    },
}

impl StreamEvent {
    /// The `type` discriminant as written on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Update { .. } => "update",
            Self::Heartbeat { .. } => "heartbeat",
            Self::StreamError { .. } => "stream-error",
        }
    }

    /// Serialize to the `{type, data?, meta, error?}` JSON object used as
    /// the SSE `data:` line.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let kind = self.kind();
        let mut body = match self {
            Self::Init { data, meta } | Self::Update { data, meta } => serde_json::json!({
                "type": kind,
                "data": data,
                "meta": meta,
            }),
            Self::Heartbeat { meta } => serde_json::json!({
                "type": kind,
                "meta": meta,
            }),
            Self::StreamError { meta, error } => serde_json::json!({
                "type": kind,
                "meta": meta,
                "error": error,
            }),
        };
        if let Some(obj) = body.as_object_mut() {
            obj.retain(|_, v| !v.is_null());
        }
        body
    }
}
