use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::storage::DEFAULT_CACHE_CONTROL;
use crate::supervisor::{DEFAULT_LESSON_PATTERN, DEFAULT_MODULE_PATTERN};
use crate::worker::WorkerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
///
/// The migration ledger and the job queue share this file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("coursebridge.db")
}

/// Object storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Mirror objects into a local directory served under `/content`.
    #[default]
    Fs,
    /// S3-style HTTP PUT.
    Http,
}

/// Local directories and object storage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Where the fetch executable writes course trees.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    #[serde(default)]
    pub backend: StorageBackend,
    /// Bucket root for the `fs` backend.
    #[serde(default = "default_bucket_dir")]
    pub bucket_dir: PathBuf,
    /// URL prefix under which `fs` objects are reachable.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Required when backend = "http".
    #[serde(default)]
    pub http: Option<HttpStoreConfig>,
    #[serde(default = "default_max_parallel_uploads")]
    pub max_parallel_uploads: usize,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            backend: StorageBackend::default(),
            bucket_dir: default_bucket_dir(),
            public_base_url: default_public_base_url(),
            http: None,
            max_parallel_uploads: default_max_parallel_uploads(),
            cache_control: default_cache_control(),
        }
    }
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_bucket_dir() -> PathBuf {
    PathBuf::from("bucket")
}

fn default_public_base_url() -> String {
    "http://localhost:8080/content".to_string()
}

fn default_max_parallel_uploads() -> usize {
    4
}

fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}

/// HTTP object store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpStoreConfig {
    /// e.g. `https://s3.eu-west-1.amazonaws.com`
    pub endpoint: String,
    pub bucket: String,
    /// Base of the public object URLs.
    pub public_base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

fn default_upload_timeout() -> u64 {
    300
}

/// Fetch executable settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Directory for per-job scratch manifests.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Kill runs after this many seconds. 0 = no limit.
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default)]
    pub markers: MarkerConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            scratch_dir: default_scratch_dir(),
            timeout_secs: 0,
            markers: MarkerConfig::default(),
        }
    }
}

fn default_executable() -> PathBuf {
    PathBuf::from("kiwifyDownload")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("temp")
}

/// Marker line patterns. Each needs one capture group for the name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkerConfig {
    #[serde(default = "default_module_pattern")]
    pub module: String,
    #[serde(default = "default_lesson_pattern")]
    pub lesson: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            module: default_module_pattern(),
            lesson: default_lesson_pattern(),
        }
    }
}

fn default_module_pattern() -> String {
    DEFAULT_MODULE_PATTERN.to_string()
}

fn default_lesson_pattern() -> String {
    DEFAULT_LESSON_PATTERN.to_string()
}

/// Remote course platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_url")]
    pub base_url: String,
    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            timeout_secs: default_platform_timeout(),
        }
    }
}

fn default_platform_url() -> String {
    "https://admin-api.kiwify.com.br/v1".to_string()
}

fn default_platform_timeout() -> u64 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: SanitizedStorageConfig,
    pub fetcher: FetcherConfig,
    pub worker: WorkerConfig,
    pub platform: PlatformConfig,
}

/// Storage config with the upload token hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub downloads_dir: PathBuf,
    pub backend: StorageBackend,
    pub public_base_url: String,
    pub max_parallel_uploads: usize,
    pub token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let storage = &config.storage;
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: SanitizedStorageConfig {
                downloads_dir: storage.downloads_dir.clone(),
                backend: storage.backend,
                public_base_url: match (&storage.backend, &storage.http) {
                    (StorageBackend::Http, Some(http)) => http.public_base_url.clone(),
                    _ => storage.public_base_url.clone(),
                },
                max_parallel_uploads: storage.max_parallel_uploads,
                token_configured: storage
                    .http
                    .as_ref()
                    .map(|h| h.token.is_some())
                    .unwrap_or(false),
            },
            fetcher: config.fetcher.clone(),
            worker: config.worker.clone(),
            platform: config.platform.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path, PathBuf::from("coursebridge.db"));
        assert_eq!(config.storage.backend, StorageBackend::Fs);
        assert_eq!(config.storage.cache_control, "public, max-age=31536000");
        assert_eq!(config.fetcher.executable, PathBuf::from("kiwifyDownload"));
        assert_eq!(config.fetcher.timeout_secs, 0);
        assert_eq!(config.fetcher.markers.lesson, DEFAULT_LESSON_PATTERN);
        assert_eq!(config.worker.concurrency, 1);
        assert_eq!(config.worker.settle_delay_ms, 2000);
    }

    #[test]
    fn test_deserialize_http_storage() {
        let toml = r#"
[storage]
backend = "http"
downloads_dir = "/data/downloads"

[storage.http]
endpoint = "https://s3.example.com"
bucket = "courses"
public_base_url = "https://cdn.example.com"
token = "secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Http);
        let http = config.storage.http.as_ref().unwrap();
        assert_eq!(http.bucket, "courses");
        assert_eq!(http.timeout_secs, 300);

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.storage.token_configured);
        assert_eq!(sanitized.storage.public_base_url, "https://cdn.example.com");
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_deserialize_custom_markers() {
        let toml = r#"
[fetcher]
timeout_secs = 3600

[fetcher.markers]
module = "MOD (.+)"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fetcher.timeout_secs, 3600);
        assert_eq!(config.fetcher.markers.module, "MOD (.+)");
        assert_eq!(config.fetcher.markers.lesson, DEFAULT_LESSON_PATTERN);
    }
}
