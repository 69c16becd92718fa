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

//! Logging and metrics initialisation for the fleet management plane.
//!
//! Layout: `init.rs` (tracing subscriber installation), `metrics.rs`
//! (Prometheus registry and recorders).

/// Tracing subscriber setup.
pub mod init;
/// Prometheus metrics registry.
pub mod metrics;

pub use init::{init_logging, LogFormat, LoggingConfig};
pub use metrics::Metrics;
