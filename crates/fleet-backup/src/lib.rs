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

//! Backup Service (C6): scheduled and on-demand snapshots of a qBittorrent
//! instance's torrents into content-addressed blobs plus a JSON manifest,
//! with crash recovery, retention pruning, and manifest import.
//!
//! Owns no network code of its own: [`service::BackupService`] drives a
//! `fleet_qbit::ClientPool` for exports and a `repository::BackupRepository`
//! for persistence, the same collaborator split `fleet_rules::RulesEngine`
//! uses.

pub mod error;
pub mod executor;
pub mod fsops;
pub mod manifest;
pub mod queue;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use error::{BackupError, BackupResult};
pub use repository::BackupRepository;
pub use service::BackupService;
