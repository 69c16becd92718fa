//! Subscription group: the coalescing/delivery unit.
//!
//! Invariant: at most one delivery loop runs per group at any time, and
//! `sending == false && pending.is_none()` implies no delivery loop is
//! running (group liveness).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::warn;

use crate::event::{EventMeta, StreamEvent};
use crate::options::StreamOptions;
use crate::subscription::{Subscription, SubscriptionId};

/// Payload deadline applied to every group delivery.
const PAYLOAD_BUILD_TIMEOUT: Duration = Duration::from_secs(10);

/// The kind of payload a pending delivery will build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Initial snapshot for a newly-active subscriber.
    Init,
    /// A refreshed view following a successful sync poll.
    Update,
}

/// All subscribers sharing one canonical [`stream_options_key`](crate::options::stream_options_key).
pub struct SubscriptionGroup {
    /// Canonical key shared by every member subscription.
    pub key: String,
    /// The query every member subscription was registered with.
    pub options: StreamOptions,
    subs: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,
    pending: Mutex<Option<PendingKind>>,
    sending: Mutex<bool>,
}

impl SubscriptionGroup {
    /// Start an empty group for `options`.
    #[must_use]
    pub fn new(key: String, options: StreamOptions) -> Self {
        Self {
            key,
            options,
            subs: RwLock::new(HashMap::new()),
            pending: Mutex::new(None),
            sending: Mutex::new(false),
        }
    }

    /// Add a subscriber to this group.
    pub async fn add(&self, subscription: Arc<Subscription>) {
        self.subs.write().await.insert(subscription.id, subscription);
    }

    /// Remove a subscriber; returns `true` if the group is now empty.
    pub async fn remove(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subs.write().await;
        subs.remove(&id);
        subs.is_empty()
    }

    /// Number of subscribers currently in the group.
    pub async fn subscriber_count(&self) -> usize {
        self.subs.read().await.len()
    }

    /// Snapshot of the current subscriber list.
    pub async fn subscribers(&self) -> Vec<Arc<Subscription>> {
        self.subs.read().await.values().cloned().collect()
    }

    /// Enqueue a delivery, coalescing with anything already pending
    /// ("newest wins"). Returns `true` if no delivery loop was running and
    /// the caller must spawn one.
    #[must_use]
    pub fn enqueue(&self, kind: PendingKind) -> bool {
        *self.pending.lock().unwrap() = Some(kind);
        let mut sending = self.sending.lock().unwrap();
        if *sending {
            false
        } else {
            *sending = true;
            true
        }
    }

    /// Run the delivery loop until the pending slot is empty, then clear
    /// `sending`. Intended to be spawned as its own task by the manager
    /// immediately after a winning [`Self::enqueue`] call.
    pub async fn run_delivery_loop(self: Arc<Self>, sync: Arc<fleet_sync::SyncManager>) {
        loop {
            let kind = match self.pending.lock().unwrap().take() {
                Some(kind) => kind,
                None => {
                    *self.sending.lock().unwrap() = false;
                    return;
                }
            };

            let query = self.options.to_torrent_query();
            let result = tokio::time::timeout(
                PAYLOAD_BUILD_TIMEOUT,
                sync.get_torrents_with_filters(self.options.instance_id, &query),
            )
            .await;

            let subscribers = self.subscribers().await;

            for subscriber in subscribers {
                let mut meta = EventMeta::new(self.options.instance_id, &subscriber.client_key);
                let event = match &result {
                    Ok(Ok(response)) => {
                        meta.rid = Some(response.rid);
                        meta.full_update = Some(response.full_update);
                        match kind {
                            PendingKind::Init => StreamEvent::Init {
                                data: response.clone(),
                                meta,
                            },
                            PendingKind::Update => StreamEvent::Update {
                                data: response.clone(),
                                meta,
                            },
                        }
                    }
                    Ok(Err(err)) => StreamEvent::StreamError {
                        meta,
                        error: err.to_string(),
                    },
                    Err(_) => {
                        warn!(
                            instance_id = self.options.instance_id,
                            group = %self.key,
                            "payload build timed out"
                        );
                        StreamEvent::StreamError {
                            meta,
                            error: "payload build timed out".to_string(),
                        }
                    }
                };
                subscriber.publish(event);
            }
        }
    }
}
