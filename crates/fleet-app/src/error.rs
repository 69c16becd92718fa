//! Application-level error type for bootstrap and wiring failures.

use thiserror::Error;

/// Result alias for application bootstrap operations.
pub type AppResult<T> = Result<T, AppError>;

/// Errors that can abort the application bootstrap sequence.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded from the environment.
    #[error("configuration load failed")]
    Config(#[from] fleet_config::ConfigError),
    /// The shared Postgres pool could not be established or migrated.
    #[error("database connection failed")]
    Database(#[from] sqlx::Error),
    /// The shared persistence layer failed to initialize.
    #[error("data store initialization failed")]
    DataStore(#[from] fleet_data::DataError),
    /// The Backup Service failed to recover interrupted runs or start its
    /// worker pool.
    #[error("backup service startup failed")]
    Backup(#[from] fleet_backup::BackupError),
    /// The configured backup data directory is unusable.
    #[error("backup data directory unusable: {path}")]
    DataDirUnusable {
        /// Path that could not be created or written to.
        path: String,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The HTTP listener failed to bind or the server terminated unexpectedly.
    #[error("http server failed")]
    Http(#[from] std::io::Error),
    /// The configured bind address/port did not form a valid socket address.
    #[error("invalid bind address {addr}")]
    InvalidBindAddr {
        /// The address/port string that failed to parse.
        addr: String,
        /// Underlying parse failure.
        #[source]
        source: std::net::AddrParseError,
    },
}
