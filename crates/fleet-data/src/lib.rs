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

//! Shared Postgres persistence for the Tracker Rules Engine and Backup
//! Service: tracker rules, activity history, and backup runs/items/settings.
//!
//! Plain inline SQL throughout, no stored procedures: every invariant
//! (evaluation order, retention, blob refcounting) is owned by application
//! code in [`store`], not database triggers.

/// Typed error surface for this crate.
pub mod error;
/// Row projections and domain enums.
pub mod model;
/// `DataStore`, the shared repository handle.
pub mod store;

pub use error::{DataError, DataResult};
pub use store::DataStore;
