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

//! Sync Manager (C3): maintains a live per-instance torrent snapshot by
//! polling the qBittorrent Client Pool's incremental sync endpoint, and
//! serves sorted/filtered/paged views over the cached snapshot.
//!
//! Owns no network code of its own: [`SyncManager`] drives a
//! `fleet_qbit::ClientPool` and applies the merge/backoff/sink-dispatch
//! logic described here.

/// `SyncError`, the typed error surface for this crate.
pub mod error;
/// `SyncManager`, the per-instance snapshot cache and poll driver.
pub mod manager;
/// Shared value types: sort/filter query shape and response envelope.
pub mod model;
/// `SyncEventSink`, the callback contract fired on every poll outcome.
pub mod sink;

pub use error::SyncError;
pub use manager::SyncManager;
pub use model::{SortOrder, TorrentFilters, TorrentQuery, TorrentResponse};
pub use sink::SyncEventSink;
