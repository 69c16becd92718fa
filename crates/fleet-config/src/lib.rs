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

//! Static configuration for the fleet management plane.
//!
//! Layout: `model.rs` (typed configuration structs), `defaults.rs` (the
//! numeric defaults fixed by the external interface), `validate.rs`
//! (`ConfigError` and range/path checks), `loader.rs` (environment-variable
//! loading). Unlike a live settings service, configuration here is loaded
//! once at process start and frozen for the process lifetime — hot-reload is
//! an explicit non-goal.

/// Numeric defaults recognized by each component (§6.5).
pub mod defaults;
/// Environment-variable loading.
pub mod loader;
/// Typed configuration models.
pub mod model;
/// Validation helpers and `ConfigError`.
pub mod validate;

pub use loader::load_from_env;
pub use model::{AppConfig, BackupConfig, RulesConfig, StreamConfig};
pub use validate::ConfigError;
