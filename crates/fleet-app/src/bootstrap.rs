//! Process bootstrap: load configuration, wire C1–C7 together, serve HTTP
//! until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleet_backup::BackupService;
use fleet_config::AppConfig;
use fleet_data::DataStore;
use fleet_qbit::testing::{InMemoryClientPool, InMemoryInstanceRegistry};
use fleet_qbit::{ClientPool, InstanceRegistry};
use fleet_rules::RulesEngine;
use fleet_stream::StreamManager;
use fleet_sync::SyncManager;
use fleet_telemetry::{init_logging, LogFormat, LoggingConfig, Metrics};

use crate::error::{AppError, AppResult};
use crate::http::build_router;
use crate::state::AppState;

/// Entry point for the binary: load configuration, wire every subsystem,
/// and block serving HTTP until shutdown.
///
/// # Errors
///
/// Returns an error if configuration loading, database connection, or the
/// HTTP listener fails.
pub async fn run_app() -> AppResult<()> {
    let config = fleet_config::load_from_env()?;
    let logging = LoggingConfig {
        level: &config.log_level,
        format: LogFormat::parse(&config.log_format),
    };
    let _ = init_logging(&logging);

    info!("fleet application bootstrap starting");
    run_app_with(config).await
}

/// Boot sequence driven entirely by an already-loaded [`AppConfig`], so
/// integration tests can construct one without touching the process
/// environment.
pub(crate) async fn run_app_with(config: AppConfig) -> AppResult<()> {
    std::fs::create_dir_all(&config.backup.data_dir).map_err(|source| AppError::DataDirUnusable {
        path: config.backup.data_dir.clone(),
        source,
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;
    let data_store = Arc::new(DataStore::new(pool).await?);

    // C1/C2 (Instance Registry, qBittorrent Client Pool) are external
    // collaborators this repository does not implement a network client
    // for; the in-memory double stands in for "no real daemon endpoint
    // configured".
    let registry: Arc<dyn InstanceRegistry> = Arc::new(InMemoryInstanceRegistry::new(Vec::new()));
    let pool: Arc<dyn ClientPool> = Arc::new(InMemoryClientPool::new(Vec::new()));

    let telemetry = Arc::new(Metrics::new());
    let cancel = CancellationToken::new();

    let sync = Arc::new(SyncManager::new(Arc::clone(&pool), Arc::clone(&telemetry)));

    let stream_manager = StreamManager::new(Arc::clone(&registry), Arc::clone(&sync), Arc::clone(&telemetry));
    stream_manager.install().await;

    let rules_engine = RulesEngine::new(
        Arc::clone(&registry),
        Arc::clone(&pool),
        Arc::clone(&sync),
        Arc::clone(&data_store) as Arc<dyn fleet_rules::RulesRepository>,
        config.rules.clone(),
        Arc::clone(&telemetry),
    );
    let (rules_scan_handle, rules_sweep_handle) = rules_engine.spawn(cancel.clone()).await;

    let backup_service = BackupService::new(
        Arc::clone(&data_store),
        Arc::clone(&registry),
        Arc::clone(&pool),
        &config.backup.data_dir,
        config.backup.worker_count,
        Arc::clone(&telemetry),
    );
    let backup_handles = backup_service.spawn(cancel.clone()).await?;

    let state = AppState::new(Arc::clone(&stream_manager), Arc::clone(&telemetry));
    state.mark_ready();

    let addr_str = format!("{}:{}", config.bind_addr, config.http_port);
    let addr: SocketAddr = addr_str
        .parse()
        .map_err(|source| AppError::InvalidBindAddr { addr: addr_str.clone(), source })?;
    info!(%addr, "launching HTTP listener");

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_cancel = cancel.clone();
    let serve_result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_cancel.cancel();
        })
        .await;

    cancel.cancel();
    stream_manager.shutdown().await;

    if let Err(err) = rules_scan_handle.await {
        warn!(error = %err, "rules scan loop join failed");
    }
    if let Err(err) = rules_sweep_handle.await {
        warn!(error = %err, "rules debounce sweep loop join failed");
    }
    for handle in backup_handles {
        if let Err(err) = handle.await {
            warn!(error = %err, "backup worker/scheduler task join failed");
        }
    }

    serve_result?;
    info!("fleet application shutdown complete");
    Ok(())
}
