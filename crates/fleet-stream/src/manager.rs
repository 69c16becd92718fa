//! Top-level Stream Manager orchestrator.
//!
//! Locking hierarchy (must be acquired in this order to prevent deadlock):
//! manager lock (`groups`/`instances`) → group lock (a group's internal
//! `pending`/`sending` state) → group-subscribers lock (a group's `subs`
//! map). See [`crate::group::SubscriptionGroup`].
//!
//! Concurrency model note: the source material models the per-instance sync
//! loop as a goroutine with a timer that calls `Reset(interval)` after every
//! tick so runs never overlap and so a backoff change takes effect on the
//! next tick. This implementation gets the same effect the idiomatic async
//! way: the sync loop re-reads the shared [`SyncBackoff`] interval from
//! scratch at the top of every iteration, so a sink callback mutating the
//! backoff is picked up on the very next sleep without any explicit
//! "restart the loop" step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleet_qbit::{InstanceRegistry, MainDataSnapshot, QbitError};
use fleet_sync::{SyncEventSink, SyncManager as FleetSyncManager};
use fleet_telemetry::Metrics;

use crate::backoff::SyncBackoff;
use crate::error::{StreamError, StreamResult};
use crate::event::{EventMeta, StreamEvent};
use crate::group::{PendingKind, SubscriptionGroup};
use crate::options::StreamOptions;
use crate::subscription::{Subscription, SubscriptionId};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const SYNC_POLL_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-subscriber event channel capacity. A full channel means the
/// subscriber's SSE write loop has fallen behind; `Subscription::publish`
/// drops the event rather than blocking the shared delivery loop.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

/// One element of the `streams` query parameter's JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamDescriptor {
    /// Caller-supplied key echoed back as `meta.streamKey`.
    pub key: String,
    /// The query this descriptor subscribes to.
    #[serde(flatten)]
    pub options: StreamOptions,
}

struct InstanceLoopState {
    subscriber_count: u32,
    backoff: Arc<Mutex<SyncBackoff>>,
    cancel: CancellationToken,
    sync_handle: JoinHandle<()>,
    heartbeat_handle: JoinHandle<()>,
}

/// Accepts HTTP stream requests, groups subscribers by query signature,
/// drives per-instance polling through the Sync Manager, and fans out
/// events to every affected subscriber.
pub struct StreamManager {
    registry: Arc<dyn InstanceRegistry>,
    sync: Arc<FleetSyncManager>,
    groups: RwLock<HashMap<String, Arc<SubscriptionGroup>>>,
    instances: RwLock<HashMap<i64, InstanceLoopState>>,
    shutting_down: AtomicBool,
    metrics: Arc<Metrics>,
}

impl StreamManager {
    /// Construct a manager with no subscribers and no running loops. Call
    /// [`Self::install`] once before serving requests so sync poll outcomes
    /// reach this manager.
    #[must_use]
    pub fn new(
        registry: Arc<dyn InstanceRegistry>,
        sync: Arc<FleetSyncManager>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            sync,
            groups: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
            metrics,
        })
    }

    /// Register this manager as the Sync Manager's event sink. Must be
    /// called exactly once, after construction, before any `force_sync`.
    pub async fn install(self: &Arc<Self>) {
        self.sync.register_sink(Arc::clone(self) as Arc<dyn SyncEventSink>).await;
    }

    /// Whether [`Self::shutdown`] has already been invoked.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Register one or more stream descriptors from a single HTTP request.
    /// All-or-nothing: if any descriptor is invalid or references an
    /// unknown instance, no subscription from the batch is registered.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ShuttingDown`], [`StreamError::InvalidDescriptor`],
    /// or [`StreamError::InstanceNotFound`].
    pub async fn serve(
        self: &Arc<Self>,
        descriptors: Vec<StreamDescriptor>,
    ) -> StreamResult<Vec<(SubscriptionId, mpsc::Receiver<StreamEvent>)>> {
        if self.is_shutting_down() {
            return Err(StreamError::ShuttingDown);
        }
        for descriptor in &descriptors {
            descriptor.options.validate()?;
        }
        for descriptor in &descriptors {
            if self.registry.get(descriptor.options.instance_id).await.is_none() {
                return Err(StreamError::InstanceNotFound {
                    instance_id: descriptor.options.instance_id,
                });
            }
        }

        let mut results = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            results.push(self.register_one(descriptor).await);
        }
        Ok(results)
    }

    async fn register_one(
        self: &Arc<Self>,
        descriptor: StreamDescriptor,
    ) -> (SubscriptionId, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let instance_id = descriptor.options.instance_id;
        let subscription = Arc::new(Subscription::new(
            instance_id,
            descriptor.key,
            descriptor.options,
            tx,
        ));
        let group_key = subscription.group_key.clone();

        let group = {
            let mut groups = self.groups.write().await;
            let existed = groups.contains_key(&group_key);
            let group = Arc::clone(
                groups
                    .entry(group_key.clone())
                    .or_insert_with(|| Arc::new(SubscriptionGroup::new(group_key, subscription.options.clone()))),
            );
            if !existed {
                self.metrics.active_groups.inc();
            }
            group
        };
        group.add(Arc::clone(&subscription)).await;

        self.note_subscriber_added(instance_id).await;
        self.metrics.active_subscriptions.inc();

        subscription.mark_active();
        if group.enqueue(PendingKind::Init) {
            tokio::spawn(Arc::clone(&group).run_delivery_loop(Arc::clone(&self.sync)));
        }

        (subscription.id, rx)
    }

    /// Remove a subscription after its SSE connection ends, dropping the
    /// owning group and/or instance loops if this was the last subscriber.
    pub async fn remove_subscription(&self, instance_id: i64, group_key: &str, id: SubscriptionId) {
        let group_emptied = {
            let groups = self.groups.read().await;
            match groups.get(group_key) {
                Some(group) => group.remove(id).await,
                None => return,
            }
        };
        if group_emptied {
            self.groups.write().await.remove(group_key);
            self.metrics.active_groups.dec();
        }
        self.metrics.active_subscriptions.dec();
        self.note_subscriber_removed(instance_id).await;
    }

    async fn note_subscriber_added(self: &Arc<Self>, instance_id: i64) {
        let mut instances = self.instances.write().await;
        if let Some(state) = instances.get_mut(&instance_id) {
            state.subscriber_count += 1;
            return;
        }

        let backoff = Arc::new(Mutex::new(SyncBackoff::new()));
        let cancel = CancellationToken::new();
        let sync_handle = tokio::spawn(sync_loop(
            instance_id,
            Arc::clone(&self.sync),
            Arc::clone(&backoff),
            cancel.clone(),
        ));
        let heartbeat_handle = tokio::spawn(heartbeat_loop(
            instance_id,
            Arc::clone(self),
            cancel.clone(),
        ));
        instances.insert(
            instance_id,
            InstanceLoopState {
                subscriber_count: 1,
                backoff,
                cancel,
                sync_handle,
                heartbeat_handle,
            },
        );
        info!(instance_id, "started sync and heartbeat loops");
    }

    async fn note_subscriber_removed(&self, instance_id: i64) {
        let mut instances = self.instances.write().await;
        let Some(state) = instances.get_mut(&instance_id) else {
            return;
        };
        state.subscriber_count = state.subscriber_count.saturating_sub(1);
        if state.subscriber_count == 0 {
            let state = instances.remove(&instance_id).expect("just matched");
            state.cancel.cancel();
            state.sync_handle.abort();
            state.heartbeat_handle.abort();
            info!(instance_id, "stopped sync and heartbeat loops");
        }
    }

    async fn groups_for_instance(&self, instance_id: i64) -> Vec<Arc<SubscriptionGroup>> {
        self.groups
            .read()
            .await
            .values()
            .filter(|group| group.options.instance_id == instance_id)
            .cloned()
            .collect()
    }

    async fn broadcast_stream_error(&self, instance_id: i64, retry_in_seconds: u64, reason: &str) {
        for group in self.groups_for_instance(instance_id).await {
            for subscriber in group.subscribers().await {
                let mut meta = EventMeta::new(instance_id, &subscriber.client_key);
                meta.retry_in_seconds = Some(retry_in_seconds);
                subscriber.publish(StreamEvent::StreamError {
                    meta,
                    error: reason.to_string(),
                });
            }
        }
    }

    async fn broadcast_heartbeat(&self, instance_id: i64) {
        for group in self.groups_for_instance(instance_id).await {
            for subscriber in group.subscribers().await {
                let meta = EventMeta::new(instance_id, &subscriber.client_key);
                subscriber.publish(StreamEvent::Heartbeat { meta });
            }
        }
    }

    /// Idempotent teardown: refuse new requests, cancel every per-instance
    /// loop, and drop all subscriber bookkeeping.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut instances = self.instances.write().await;
        for (instance_id, state) in instances.drain() {
            state.cancel.cancel();
            state.sync_handle.abort();
            state.heartbeat_handle.abort();
            info!(instance_id, "shutdown: stopped instance loops");
        }
        self.groups.write().await.clear();
    }
}

#[async_trait]
impl SyncEventSink for StreamManager {
    async fn on_main_data(&self, instance_id: i64, _snapshot: &MainDataSnapshot) {
        let changed = {
            let instances = self.instances.read().await;
            match instances.get(&instance_id) {
                Some(state) => state.backoff.lock().unwrap().mark_success(),
                None => return,
            }
        };
        if changed {
            info!(instance_id, "sync recovered, reset to default interval");
        }
        for group in self.groups_for_instance(instance_id).await {
            if group.enqueue(PendingKind::Update) {
                tokio::spawn(Arc::clone(&group).run_delivery_loop(Arc::clone(&self.sync)));
            }
        }
    }

    async fn on_sync_error(&self, instance_id: i64, error: &QbitError) {
        let retry = {
            let instances = self.instances.read().await;
            match instances.get(&instance_id) {
                Some(state) => state.backoff.lock().unwrap().mark_failure().1,
                None => return,
            }
        };
        warn!(instance_id, error = %error, retry_in_seconds = retry, "sync failed");
        self.broadcast_stream_error(instance_id, retry, &error.to_string())
            .await;
    }
}

async fn sync_loop(
    instance_id: i64,
    sync: Arc<FleetSyncManager>,
    backoff: Arc<Mutex<SyncBackoff>>,
    cancel: CancellationToken,
) {
    loop {
        let interval = backoff.lock().unwrap().interval();
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }
        let _ = tokio::time::timeout(SYNC_POLL_TIMEOUT, sync.force_sync(instance_id)).await;
    }
}

async fn heartbeat_loop(instance_id: i64, manager: Arc<StreamManager>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                manager.broadcast_heartbeat(instance_id).await;
            }
        }
    }
}
