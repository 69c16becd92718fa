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

//! Ambient application shell (C7): process bootstrap, configuration
//! loading, logging/metrics init, and the HTTP surface that wires
//! `/stream`, `/healthz`, and `/metrics` in front of the Sync Manager,
//! Stream Manager, Tracker Rules Engine, and Backup Service.
//!
//! Owns no domain logic of its own — every subsystem is constructed and
//! spawned in [`bootstrap::run_app`].

/// Process bootstrap and service wiring.
pub mod bootstrap;
/// Application-level error type.
pub mod error;
/// Ambient HTTP surface (`/stream`, `/healthz`, `/metrics`).
pub mod http;
/// Shared application state handed to HTTP handlers.
pub mod state;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
