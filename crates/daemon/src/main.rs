//! Rowcast Export Daemon - Main Entry Point
//!
//! Composition root: wires the SQLite adapters, the export engine and the
//! JSON-RPC server together.

mod telemetry;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rowcast_api_rpc::{server::RpcServerConfig, ActiveExports, RpcServer};
use rowcast_core::application::engine::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_PACING_DELAY};
use rowcast_core::application::recovery::ExportRecovery;
use rowcast_core::application::{EngineConfig, ExportEngine};
use rowcast_core::port::clock::SystemClock;
use rowcast_core::port::id_provider::UuidProvider;
use rowcast_infra_sqlite::{create_pool, run_migrations, SqliteExportJobStore, SqliteProductSource};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.rowcast/rowcast.db";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("ROWCAST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,sqlx=warn"))
        .expect("Failed to create env filter");

    // Optional rolling file output alongside the console
    let (file_layer, _file_guard) = match std::env::var("ROWCAST_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rowcastd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Rowcast export daemon v{} starting...", VERSION);

    // 1.1. Initialize OpenTelemetry (optional)
    if let Err(e) = telemetry::init_telemetry() {
        tracing::warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    // 2. Load configuration
    let db_path = std::env::var("ROWCAST_DB_PATH")
        .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());

    let rpc_port: u16 = std::env::var("ROWCAST_RPC_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9541);

    let chunk_size: u32 = std::env::var("ROWCAST_CHUNK_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CHUNK_SIZE);

    let pacing_delay = std::env::var("ROWCAST_PACING_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_PACING_DELAY);

    info!(db_path = %db_path, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let clock = Arc::new(SystemClock);
    let id_provider = Arc::new(UuidProvider);
    let store = Arc::new(SqliteExportJobStore::new(pool.clone(), clock.clone()));
    let source = Arc::new(SqliteProductSource::new(pool.clone()));

    let engine = ExportEngine::new(
        store.clone(),
        source.clone(),
        EngineConfig {
            chunk_size,
            pacing_delay,
        },
    );
    let active_exports = Arc::new(ActiveExports::new());

    // 5. Recovery sweep: exports orphaned by a crash become FAILED and
    // resumable from their last checkpoint.
    info!("Running export recovery sweep...");
    let recovery = ExportRecovery::new(store.clone());
    match recovery.recover_interrupted().await {
        Ok(count) => info!(recovered_jobs = count, "Recovery sweep completed"),
        Err(e) => tracing::error!(error = ?e, "Recovery sweep failed"),
    }

    // 6. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        store.clone(),
        source.clone(),
        engine,
        active_exports.clone(),
        id_provider.clone(),
        clock.clone(),
    );
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!("System ready. Waiting for export requests...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop intake first, then drain active exports.
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;

    let cancelled = active_exports.cancel_all();
    if cancelled > 0 {
        info!(cancelled = %cancelled, "Waiting for active exports to checkpoint and stop...");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while active_exports.count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if active_exports.count() > 0 {
            tracing::warn!(
                remaining = active_exports.count(),
                "Shutdown timeout; remaining exports stay resumable from their last checkpoint"
            );
        }
    }

    info!("Shutdown complete.");

    Ok(())
}
