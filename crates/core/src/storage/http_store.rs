//! Object store speaking the S3-style `PUT <endpoint>/<bucket>/<key>` protocol.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{validate_key, ObjectStore, PutOptions, StorageError};
use crate::config::HttpStoreConfig;

/// Uploads objects over HTTP.
pub struct HttpObjectStore {
    client: Client,
    config: HttpStoreConfig,
}

impl HttpObjectStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, StorageError> {
        // A transfer may outlast `timeout_secs`; only stalls time out.
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| StorageError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket,
            encode_key(key)
        )
    }
}

/// Percent-encodes each key segment, keeping the separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn put_file(
        &self,
        key: &str,
        local: &Path,
        options: &PutOptions,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        let file = tokio::fs::File::open(local)
            .await
            .map_err(|e| StorageError::io(local, e))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| StorageError::io(local, e))?
            .len();

        let url = self.object_url(key);
        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut request = self
            .client
            .put(&url)
            .header(CACHE_CONTROL, &options.cache_control)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(ReaderStream::new(file)));
        if options.public {
            request = request.header("x-amz-acl", "public-read");
        }
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Rejected {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(key, url = %url, bytes = length, "Object stored");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            encode_key(key)
        )
    }
}
