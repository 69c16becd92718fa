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

//! Tracker Rules Engine (C5): every scan interval, for every active
//! instance, matches torrents against tracker-domain rules and issues
//! batched, debounced mutations — speed/share limits, ratio/seeding-time
//! deletions, cross-seed-aware file preservation, and unregistered-torrent
//! cleanup.
//!
//! Owns no network code of its own: [`engine::RulesEngine`] drives a
//! `fleet_sync::SyncManager` for reads and a `fleet_qbit::ClientPool` for
//! mutations, the same split `fleet_sync`/`fleet_stream` use.

/// Mutation batching into setting-keyed, size-bounded sub-batches.
pub mod batching;
/// Per-instance debounce maps for applied limits and queued deletions.
pub mod debounce;
/// Deletion decision, cross-seed detection, and delete-mode resolution.
pub mod deletion;
/// `RulesEngine`, the periodic scan driver.
pub mod engine;
/// `RulesError`, the typed error surface for this crate.
pub mod error;
/// Tracker pattern grammar and hostname extraction.
pub mod pattern;
/// Persistence seam for rule listing and activity recording.
pub mod repository;
/// Rule selection (`selectRule`): first surviving rule wins.
pub mod selection;

pub use engine::RulesEngine;
pub use error::{RulesError, RulesResult};
pub use repository::RulesRepository;
