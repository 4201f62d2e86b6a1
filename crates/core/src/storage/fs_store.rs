//! Object store that mirrors a bucket on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_key, ObjectStore, PutOptions, StorageError};
use crate::manifest::join_relative;

/// Stores objects as files under `root/<key>`.
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path an object is stored at.
    pub fn object_path(&self, key: &str) -> PathBuf {
        join_relative(&self.root, key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn put_file(
        &self,
        key: &str,
        local: &Path,
        _options: &PutOptions,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        let dest = self.object_path(key);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        tokio::fs::copy(local, &dest)
            .await
            .map_err(|e| StorageError::io(local, e))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}
