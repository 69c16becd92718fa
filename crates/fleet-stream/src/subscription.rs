//! One subscriber's registration and lifecycle state.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::event::StreamEvent;
use crate::options::StreamOptions;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for one subscription, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle states a subscription moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered with the manager, SSE session not yet open.
    Registered,
    /// SSE session open; the subscriber is receiving events.
    Active,
    /// Teardown initiated (request canceled or `Shutdown` invoked).
    Closing,
    /// Fully removed from the manager's bookkeeping.
    Removed,
}

/// One subscriber multiplexed onto a single SSE session.
pub struct Subscription {
    /// Unique identifier.
    pub id: SubscriptionId,
    /// Instance this subscription polls.
    pub instance_id: i64,
    /// Caller-supplied key identifying this subscriber's UI panel; echoed
    /// back as `meta.streamKey` on every event addressed to it.
    pub client_key: String,
    /// Canonical `streamOptionsKey(options)` identifying this subscriber's
    /// group.
    pub group_key: String,
    /// The query this subscription was registered with.
    pub options: StreamOptions,
    /// Channel the delivery loop publishes personalized events to.
    pub sender: mpsc::Sender<StreamEvent>,
    /// Current lifecycle state.
    state: Mutex<SubscriptionState>,
    /// When this subscription was registered.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Register a new subscription in the `Registered` state.
    #[must_use]
    pub fn new(
        instance_id: i64,
        client_key: String,
        options: StreamOptions,
        sender: mpsc::Sender<StreamEvent>,
    ) -> Self {
        let group_key = crate::options::stream_options_key(&options);
        Self {
            id: SubscriptionId::next(),
            instance_id,
            client_key,
            group_key,
            options,
            sender,
            state: Mutex::new(SubscriptionState::Registered),
            created_at: Utc::now(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.state.lock().unwrap()
    }

    /// Transition to `Active`, fired by the SSE layer's `OnSession` callback.
    pub fn mark_active(&self) {
        *self.state.lock().unwrap() = SubscriptionState::Active;
    }

    /// Transition to `Closing`, ahead of removal from the manager.
    pub fn mark_closing(&self) {
        *self.state.lock().unwrap() = SubscriptionState::Closing;
    }

    /// Transition to `Removed`.
    pub fn mark_removed(&self) {
        *self.state.lock().unwrap() = SubscriptionState::Removed;
    }

    /// Best-effort delivery: a full channel or a closed receiver (the
    /// connection is already gone) is swallowed rather than surfaced as an
    /// error.
    pub fn publish(&self, event: StreamEvent) {
        let _ = self.sender.try_send(event);
    }
}
