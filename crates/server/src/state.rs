use std::path::{Path, PathBuf};
use std::sync::Arc;

use coursebridge_core::{
    Config, JobQueue, MigrationLedger, MigrationWorker, PlatformClient, QueueControl,
    SanitizedConfig, StorageBackend,
};

/// Shared application state
pub struct AppState {
    config: Config,
    queue: Arc<dyn JobQueue>,
    ledger: Arc<dyn MigrationLedger>,
    platform: Arc<dyn PlatformClient>,
    control: QueueControl,
    worker: Option<Arc<MigrationWorker>>,
}

impl AppState {
    pub fn new(
        config: Config,
        queue: Arc<dyn JobQueue>,
        ledger: Arc<dyn MigrationLedger>,
        platform: Arc<dyn PlatformClient>,
        worker: Option<Arc<MigrationWorker>>,
    ) -> Self {
        let control = QueueControl::new(Arc::clone(&queue), Arc::clone(&ledger));
        Self {
            config,
            queue,
            ledger,
            platform,
            control,
            worker,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn queue(&self) -> &dyn JobQueue {
        self.queue.as_ref()
    }

    pub fn ledger(&self) -> &dyn MigrationLedger {
        self.ledger.as_ref()
    }

    pub fn platform(&self) -> &dyn PlatformClient {
        self.platform.as_ref()
    }

    pub fn control(&self) -> &QueueControl {
        &self.control
    }

    pub fn worker(&self) -> Option<&Arc<MigrationWorker>> {
        self.worker.as_ref()
    }

    /// Directory served under `/content`, when objects live on local disk.
    pub fn content_root(&self) -> Option<PathBuf> {
        match self.config.storage.backend {
            StorageBackend::Fs => Some(self.config.storage.bucket_dir.clone()),
            StorageBackend::Http => None,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.config.database.path
    }
}
