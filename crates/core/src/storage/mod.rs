//! Object storage and the directory upload pipeline.

mod fs_store;
mod http_store;
mod pipeline;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use fs_store::FsObjectStore;
pub use http_store::HttpObjectStore;
pub use pipeline::{UploadPipeline, UploadSummary, DEFAULT_CACHE_CONTROL, UPLOADED_MARKER};

/// Errors returned by object stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Store rejected {key} with status {status}")]
    Rejected { key: String, status: u16 },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn io(path: &Path, err: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Errors returned by the upload pipeline.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to upload {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload pipeline closed")]
    Closed,
}

/// Headers applied to each stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub cache_control: String,
    pub content_type: Option<String>,
    /// Publicly readable object.
    pub public: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            content_type: None,
            public: true,
        }
    }
}

/// A bucket-like key/value store for files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store name for logging.
    fn name(&self) -> &str;

    /// Upload the file at `local` under `key`, overwriting any existing object.
    async fn put_file(&self, key: &str, local: &Path, options: &PutOptions)
        -> Result<(), StorageError>;

    /// Public URL of `key`. Does not check that the object exists.
    fn public_url(&self, key: &str) -> String;
}

/// Rejects keys that could escape the bucket root.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
