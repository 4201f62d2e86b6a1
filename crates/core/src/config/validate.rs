use super::{
    types::{Config, StorageBackend},
    ConfigError,
};
use crate::supervisor::MarkerParser;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker concurrency and upload parallelism are at least 1
/// - The http storage backend has its settings
/// - Marker patterns compile and have a capture group
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.worker.concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "worker.concurrency must be at least 1".to_string(),
        ));
    }

    if config.storage.max_parallel_uploads == 0 {
        return Err(ConfigError::ValidationError(
            "storage.max_parallel_uploads must be at least 1".to_string(),
        ));
    }

    if config.storage.backend == StorageBackend::Http {
        match &config.storage.http {
            None => {
                return Err(ConfigError::ValidationError(
                    "storage.http is required when storage.backend = \"http\"".to_string(),
                ))
            }
            Some(http) if http.endpoint.is_empty() || http.bucket.is_empty() => {
                return Err(ConfigError::ValidationError(
                    "storage.http.endpoint and storage.http.bucket cannot be empty".to_string(),
                ))
            }
            Some(_) => {}
        }
    }

    if config.fetcher.executable.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "fetcher.executable cannot be empty".to_string(),
        ));
    }

    MarkerParser::new(&config.fetcher.markers.module, &config.fetcher.markers.lesson)
        .map_err(|e| ConfigError::ValidationError(format!("fetcher.markers: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpStoreConfig;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = Config::default();
        config.worker.concurrency = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_http_backend_requires_settings() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Http;
        assert!(validate_config(&config).is_err());

        config.storage.http = Some(HttpStoreConfig {
            endpoint: "https://s3.example.com".to_string(),
            bucket: "courses".to_string(),
            public_base_url: "https://cdn.example.com".to_string(),
            token: None,
            timeout_secs: 60,
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_bad_marker_pattern_fails() {
        let mut config = Config::default();
        config.fetcher.markers.lesson = "no group".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("fetcher.markers"));
    }
}
