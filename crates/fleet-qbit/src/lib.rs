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

//! Contracts for the two components treated as external collaborators
//! (C1/C2): the **Instance Registry** and the **qBittorrent Client Pool**.
//!
//! Layout: `model.rs` (shared value types), `error.rs` (`QbitError`),
//! `registry.rs` (`InstanceRegistry` trait), `client.rs` (`QbitClient` /
//! `ClientPool` traits). `testing` hosts in-memory doubles used by every
//! other core crate's test suite, using default-`Unsupported` trait methods
//! for capabilities a given client build does not implement.

/// qBittorrent client and client-pool contracts (C2).
pub mod client;
/// Shared error type for collaborator failures.
pub mod error;
/// Shared value types (`Instance`, `Torrent`, `MainDataSnapshot`, ...).
pub mod model;
/// Instance registry contract (C1).
pub mod registry;
/// In-memory test doubles shared across the workspace's test suites.
pub mod testing;

pub use client::{ClientPool, QbitClient};
pub use error::QbitError;
pub use model::{
    BulkActionKind, ExportedTorrent, Instance, MainDataSnapshot, Torrent, TrackerHealthCounts,
};
pub use registry::InstanceRegistry;
