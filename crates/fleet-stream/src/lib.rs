#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Stream Manager (C4): accepts HTTP stream requests, groups subscribers by
//! query signature, drives the Sync Manager, and fans out torrent
//! responses, errors, and heartbeats as Server-Sent Events.
//!
//! Uses the `Sse<impl Stream<...>>` handler shape with keep-alive, and a
//! bounded-replay buffering idea for per-subscriber delivery, generalized
//! here to per-group coalescing and per-instance poll/backoff loops instead
//! of one global broadcast channel.

/// Exponential backoff for per-instance sync polling.
pub mod backoff;
/// `StreamError`, the typed error surface for this crate.
pub mod error;
/// `StreamEvent`/`EventMeta`, the SSE payload shapes.
pub mod event;
/// `SubscriptionGroup`, the coalescing/delivery unit.
pub mod group;
/// The axum `GET /stream` handler.
pub mod http;
/// `StreamManager`, the top-level orchestrator.
pub mod manager;
/// `StreamOptions` and its canonicalization key.
pub mod options;
/// `Subscription` and its lifecycle state.
pub mod subscription;

pub use backoff::SyncBackoff;
pub use error::StreamError;
pub use event::{EventMeta, StreamEvent};
pub use group::SubscriptionGroup;
pub use http::stream_handler;
pub use manager::{StreamDescriptor, StreamManager};
pub use options::{StreamOptions, stream_options_key};
pub use subscription::{Subscription, SubscriptionId, SubscriptionState};
