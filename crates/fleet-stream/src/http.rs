//! `GET /stream` handler: the `Sse<impl Stream<...>>` shape, `KeepAlive`
//! configuration, and query-driven filter construction.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Query, State};
use axum::response::sse::{self, Event, KeepAlive, Sse};
use futures_core::Stream;
use futures_util::stream::select_all;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::manager::{StreamDescriptor, StreamManager};
use crate::options::stream_options_key;
use crate::subscription::SubscriptionId;

/// Query parameters accepted by `GET /stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// URL-encoded JSON array of [`StreamDescriptor`].
    pub streams: String,
}

/// HTTP-level error mapped onto the appropriate status code.
pub struct HttpStreamError {
    /// The underlying typed error.
    pub source: StreamError,
}

impl axum::response::IntoResponse for HttpStreamError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.source {
            StreamError::InvalidDescriptor { .. } => axum::http::StatusCode::BAD_REQUEST,
            StreamError::InstanceNotFound { .. } => axum::http::StatusCode::NOT_FOUND,
            StreamError::ShuttingDown => axum::http::StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.source.to_string()).into_response()
    }
}

/// `GET /stream?streams=<url-encoded JSON array>`. Disables no write
/// deadline beyond axum's default (no `TimeoutLayer` is applied to this
/// route at the router level) so long-lived connections aren't cut.
pub async fn stream_handler(
    State(manager): State<Arc<StreamManager>>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send>, HttpStreamError> {
    let descriptors: Vec<StreamDescriptor> = serde_json::from_str(&query.streams).map_err(|err| {
        HttpStreamError {
            source: StreamError::InvalidDescriptor {
                reason: format!("streams parameter is not valid JSON: {err}"),
            },
        }
    })?;

    let group_keys: Vec<(i64, String)> = descriptors
        .iter()
        .map(|d| (d.options.instance_id, stream_options_key(&d.options)))
        .collect();

    let subscriptions = manager
        .serve(descriptors)
        .await
        .map_err(|source| HttpStreamError { source })?;

    let streams: Vec<_> = subscriptions
        .into_iter()
        .zip(group_keys)
        .map(|((id, rx), (instance_id, group_key))| {
            guarded_event_stream(rx, CleanupGuard {
                manager: Arc::clone(&manager),
                instance_id,
                group_key,
                id,
            })
        })
        .collect();

    Ok(Sse::new(select_all(streams)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

struct CleanupGuard {
    manager: Arc<StreamManager>,
    instance_id: i64,
    group_key: String,
    id: SubscriptionId,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let manager = Arc::clone(&self.manager);
        let instance_id = self.instance_id;
        let group_key = std::mem::take(&mut self.group_key);
        let id = self.id;
        tokio::spawn(async move {
            manager.remove_subscription(instance_id, &group_key, id).await;
        });
    }
}

fn guarded_event_stream(
    rx: mpsc::Receiver<StreamEvent>,
    guard: CleanupGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream! {
        let _guard = guard;
        let mut rx = rx;
        while let Some(event) = rx.recv().await {
            yield Ok(to_sse_event(&event));
        }
    }
}

fn to_sse_event(event: &StreamEvent) -> Event {
    sse::Event::default()
        .event(event.kind())
        .data(event.to_json().to_string())
}
