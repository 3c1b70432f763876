//! Altus Drive storage daemon.
//!
//! Wires the metadata stores, blob store, and engine components together
//! and runs the background upload sweeper until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use drive_core::config::AppConfig;
use drive_core::error::AppError;

#[tokio::main]
async fn main() {
    let env = std::env::var("DRIVE_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Daemon error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main daemon run function.
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Altus Drive v{}", env!("CARGO_PKG_VERSION"));

    // ── Metadata store bootstrap (connect + migrate) ─────────────
    let db = drive_database::MetadataDb::bootstrap(&config.database).await?;

    // ── Blob store ───────────────────────────────────────────────
    tracing::info!(provider = %config.blob.provider, "Initializing blob store");
    let blobs = drive_blob::build_blob_store(&config.blob).await?;

    // ── Metadata stores ──────────────────────────────────────────
    let file_store = Arc::new(db.file_store());
    let folder_store = Arc::new(db.folder_store());
    let upload_store = Arc::new(db.upload_store());
    let quota_store = Arc::new(db.quota_store());

    // ── Engine components ────────────────────────────────────────
    let publisher = Arc::new(drive_engine::BroadcastPublisher::default());
    let ledger = Arc::new(drive_engine::QuotaLedger::new(
        quota_store,
        config.quota.clone(),
    ));
    let versions = Arc::new(drive_engine::VersionStore::new(
        file_store.clone(),
        Arc::clone(&blobs),
        Arc::clone(&ledger),
        publisher.clone(),
    ));
    let directory = Arc::new(drive_engine::FileDirectory::new(
        folder_store,
        file_store,
        publisher.clone(),
    ));
    let manager = Arc::new(drive_engine::UploadSessionManager::new(
        upload_store.clone(),
        blobs,
        ledger,
        versions,
        directory,
        config.upload.clone(),
        config.blob.bucket.clone(),
    ));

    tracing::info!("Storage engine initialized");

    // ── Background sweeper ───────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper =
        drive_engine::UploadSweeper::new(Arc::clone(&manager), upload_store, config.upload.clone());
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
    });

    tracing::info!("Altus Drive is running; press Ctrl+C to stop");

    // ── Graceful shutdown ────────────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), sweeper_handle).await;
    db.shutdown().await;

    tracing::info!("Altus Drive shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
