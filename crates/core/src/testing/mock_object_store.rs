//! Mock object store for testing.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::storage::{ObjectStore, PutOptions, StorageError};

/// A recorded upload for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub key: String,
    pub options: PutOptions,
    pub body: Vec<u8>,
}

/// Mock implementation of the ObjectStore trait.
///
/// Provides controllable behavior for testing:
/// - Record every stored object
/// - Fail keys matching a substring
/// - Fail the next upload with a given error
/// - Simulate slow uploads
///
/// # Example
///
/// ```rust,ignore
/// use coursebridge_core::testing::MockObjectStore;
///
/// let store = Arc::new(MockObjectStore::new());
/// let pipeline = UploadPipeline::new(store.clone(), 4);
/// pipeline.upload_dir(dir, "prefix").await?;
///
/// assert_eq!(store.put_count().await, 3);
/// ```
#[derive(Debug)]
pub struct MockObjectStore {
    puts: Arc<RwLock<Vec<RecordedPut>>>,
    failing_patterns: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<StorageError>>>,
    delay_ms: Arc<RwLock<u64>>,
    base_url: String,
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            puts: Arc::new(RwLock::new(Vec::new())),
            failing_patterns: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            delay_ms: Arc::new(RwLock::new(0)),
            base_url: "https://cdn.test".to_string(),
        }
    }

    /// Get all recorded uploads.
    pub async fn recorded_puts(&self) -> Vec<RecordedPut> {
        self.puts.read().await.clone()
    }

    /// Keys of all recorded uploads, in upload order.
    pub async fn uploaded_keys(&self) -> Vec<String> {
        self.puts.read().await.iter().map(|p| p.key.clone()).collect()
    }

    pub async fn put_count(&self) -> usize {
        self.puts.read().await.len()
    }

    /// Number of uploads whose key starts with `prefix`.
    pub async fn count_with_prefix(&self, prefix: &str) -> usize {
        self.puts
            .read()
            .await
            .iter()
            .filter(|p| p.key.starts_with(prefix))
            .count()
    }

    /// Every key containing `pattern` fails with a rejected status.
    pub async fn fail_keys_containing(&self, pattern: &str) {
        self.failing_patterns.write().await.push(pattern.to_string());
    }

    /// Configure the next upload to fail with the given error.
    pub async fn set_next_error(&self, error: StorageError) {
        *self.next_error.write().await = Some(error);
    }

    /// Sleep this long inside every upload.
    pub async fn set_delay_ms(&self, ms: u64) {
        *self.delay_ms.write().await = ms;
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put_file(
        &self,
        key: &str,
        local: &Path,
        options: &PutOptions,
    ) -> Result<(), StorageError> {
        let delay = *self.delay_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        if self
            .failing_patterns
            .read()
            .await
            .iter()
            .any(|p| key.contains(p.as_str()))
        {
            return Err(StorageError::Rejected {
                key: key.to_string(),
                status: 500,
            });
        }

        let body = tokio::fs::read(local)
            .await
            .map_err(|e| StorageError::io(local, e))?;

        self.puts.write().await.push(RecordedPut {
            key: key.to_string(),
            options: options.clone(),
            body,
        });
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}
