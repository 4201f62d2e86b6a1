use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursebridge_core::{
    load_config, load_config_from_env, validate_config, Config, FsObjectStore, HttpObjectStore,
    JobQueue, KiwifyClient, MarkerParser, MigrationLedger, MigrationWorker, ObjectStore,
    PlatformClient, ProcessSupervisor, QueueControl, SqliteJobQueue, SqliteLedger,
    StorageBackend, StorageLayout, TokioProcessLauncher, UploadPipeline,
};

use coursebridge_server::api::create_router;
use coursebridge_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = read_config()?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("coursebridge {} starting", VERSION);
    info!("Database path: {:?}", config.database.path);

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }
    }

    let queue: Arc<dyn JobQueue> = Arc::new(
        SqliteJobQueue::new(&config.database.path).context("Failed to open job queue")?,
    );
    let ledger: Arc<dyn MigrationLedger> = Arc::new(
        SqliteLedger::new(&config.database.path).context("Failed to open migration ledger")?,
    );

    match std::env::args().nth(1).as_deref() {
        Some("clean-queue") => return clean_queue(queue, ledger),
        Some(other) => anyhow::bail!("Unknown command: {}", other),
        None => {}
    }

    let store = create_object_store(&config)?;
    info!("Using object store: {}", store.name());

    let platform: Arc<dyn PlatformClient> = Arc::new(
        KiwifyClient::new(config.platform.clone()).context("Failed to create platform client")?,
    );

    // Create worker if enabled
    let worker = if config.worker.enabled {
        let parser = MarkerParser::new(&config.fetcher.markers.module, &config.fetcher.markers.lesson)
            .context("Invalid marker patterns")?;
        let launcher = Arc::new(TokioProcessLauncher::new(config.fetcher.executable.clone()));
        let supervisor =
            ProcessSupervisor::new(launcher, parser).with_timeout_secs(config.fetcher.timeout_secs);
        let uploads = UploadPipeline::new(Arc::clone(&store), config.storage.max_parallel_uploads)
            .with_cache_control(config.storage.cache_control.clone());
        let layout = StorageLayout::new(
            config.storage.downloads_dir.clone(),
            config.fetcher.scratch_dir.clone(),
        );

        let worker = MigrationWorker::new(
            config.worker.clone(),
            Arc::clone(&queue),
            Arc::clone(&ledger),
            supervisor,
            uploads,
            layout,
        );
        worker.start().await;
        info!("Migration worker started");
        Some(Arc::new(worker))
    } else {
        info!("Worker disabled in config, jobs will accumulate in the queue");
        None
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        queue,
        ledger,
        platform,
        worker.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop worker if running
    if let Some(ref worker) = worker {
        info!("Stopping migration worker...");
        worker.stop().await;
    }

    info!("Server shut down");
    Ok(())
}

/// Config file from `COURSEBRIDGE_CONFIG` (default `config.toml`), or
/// defaults plus environment when the default file is absent.
fn read_config() -> Result<Config> {
    match std::env::var("COURSEBRIDGE_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        Err(_) => {
            let path = PathBuf::from("config.toml");
            if path.exists() {
                info!("Loading configuration from {:?}", path);
                load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))
            } else {
                warn!("No config.toml found, using defaults and environment");
                load_config_from_env().context("Failed to load config from environment")
            }
        }
    }
}

fn create_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackend::Fs => {
            info!(
                "Storing objects under {:?} (served at /content)",
                config.storage.bucket_dir
            );
            Ok(Arc::new(FsObjectStore::new(
                config.storage.bucket_dir.clone(),
                config.storage.public_base_url.clone(),
            )))
        }
        StorageBackend::Http => {
            let http = config
                .storage
                .http
                .clone()
                .context("storage.http is required for the http backend")?;
            info!("Uploading objects to {} (bucket {})", http.endpoint, http.bucket);
            Ok(Arc::new(
                HttpObjectStore::new(http).context("Failed to create object store client")?,
            ))
        }
    }
}

/// Admin command: empty the queue and cancel every active migration.
fn clean_queue(queue: Arc<dyn JobQueue>, ledger: Arc<dyn MigrationLedger>) -> Result<()> {
    let report = QueueControl::new(queue, ledger)
        .cancel_all()
        .context("Failed to clean queue")?;

    info!(
        "Queue cleaned: {} jobs removed, {} migrations cancelled, {} lessons failed",
        report.jobs_removed, report.migrations_cancelled, report.lessons_failed
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
