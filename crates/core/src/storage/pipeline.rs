//! Recursive directory uploads with bounded parallelism.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{join, join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{ObjectStore, PutOptions, UploadError};
use crate::metrics;

/// Cache directive applied to every uploaded object by default.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Zero-byte file written into a directory once it is fully uploaded.
pub const UPLOADED_MARKER: &str = ".uploaded";

/// Result of a directory upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub files_uploaded: usize,
    pub bytes: u64,
    /// The directory did not exist.
    pub skipped: bool,
}

impl UploadSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn merge(&mut self, other: &UploadSummary) {
        self.files_uploaded += other.files_uploaded;
        self.bytes += other.bytes;
    }
}

/// Mirrors local directory trees into an [`ObjectStore`].
///
/// Clones share the store and the parallelism limit.
#[derive(Clone)]
pub struct UploadPipeline {
    store: Arc<dyn ObjectStore>,
    permits: Arc<Semaphore>,
    cache_control: String,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, max_parallel_uploads: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_parallel_uploads.max(1))),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
        }
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = cache_control.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn public_url(&self, key: &str) -> String {
        self.store.public_url(key)
    }

    /// Upload every file below `local_dir` to `<remote_prefix>/<relative path>`.
    ///
    /// A missing directory is not an error. Every file is attempted even when
    /// some fail; the first failure is returned afterwards and no marker is
    /// written.
    pub async fn upload_dir(
        &self,
        local_dir: &Path,
        remote_prefix: &str,
    ) -> Result<UploadSummary, UploadError> {
        match tokio::fs::metadata(local_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                warn!(path = %local_dir.display(), "Upload source is not a directory, skipping");
                return Ok(UploadSummary::skipped());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %local_dir.display(), "Upload source missing, skipping");
                return Ok(UploadSummary::skipped());
            }
            Err(e) => return Err(UploadError::Io(e)),
        }

        let prefix = remote_prefix.trim_matches('/').to_string();
        let summary = self
            .clone()
            .upload_tree(local_dir.to_path_buf(), prefix)
            .await?;

        tokio::fs::write(local_dir.join(UPLOADED_MARKER), b"").await?;
        debug!(
            path = %local_dir.display(),
            prefix = remote_prefix,
            files = summary.files_uploaded,
            bytes = summary.bytes,
            "Directory uploaded"
        );
        Ok(summary)
    }

    fn upload_tree(
        self,
        dir: PathBuf,
        prefix: String,
    ) -> BoxFuture<'static, Result<UploadSummary, UploadError>> {
        async move {
            let mut files = Vec::new();
            let mut subdirs = Vec::new();

            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    subdirs.push((entry.path(), child_key(&prefix, &name)));
                } else if file_type.is_file() && name != UPLOADED_MARKER {
                    files.push((entry.path(), child_key(&prefix, &name)));
                }
            }

            let file_uploads = files
                .into_iter()
                .map(|(path, key)| self.upload_file(path, key));
            let dir_uploads = subdirs
                .into_iter()
                .map(|(path, key)| self.clone().upload_tree(path, key));

            let (file_results, dir_results) =
                join(join_all(file_uploads), join_all(dir_uploads)).await;

            let mut summary = UploadSummary::default();
            let mut first_error = None;

            for result in file_results {
                match result {
                    Ok(bytes) => {
                        summary.files_uploaded += 1;
                        summary.bytes += bytes;
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            for result in dir_results {
                match result {
                    Ok(child) => summary.merge(&child),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(summary),
            }
        }
        .boxed()
    }

    async fn upload_file(&self, path: PathBuf, key: String) -> Result<u64, UploadError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| UploadError::Closed)?;

        let bytes = tokio::fs::metadata(&path).await?.len();
        let options = PutOptions {
            cache_control: self.cache_control.clone(),
            content_type: Some(
                mime_guess::from_path(&path)
                    .first_or_octet_stream()
                    .to_string(),
            ),
            public: true,
        };

        match self.store.put_file(&key, &path, &options).await {
            Ok(()) => {
                metrics::FILES_UPLOADED
                    .with_label_values(&["success"])
                    .inc();
                metrics::BYTES_UPLOADED.inc_by(bytes);
                Ok(bytes)
            }
            Err(source) => {
                metrics::FILES_UPLOADED
                    .with_label_values(&["failure"])
                    .inc();
                warn!(key = %key, store = self.store.name(), error = %source, "Object upload failed");
                Err(UploadError::Store { key, source })
            }
        }
    }
}

fn child_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}
