//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with a temporary database and a mock platform injected, so every
//! endpoint can be exercised without a running server or network.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use coursebridge_core::{
    testing::MockPlatform, Config, JobQueue, MigrationLedger, PlatformClient, SqliteJobQueue,
    SqliteLedger,
};
use coursebridge_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use coursebridge_core::testing::fixtures;

/// Token accepted by the fixture's mock platform.
pub const TOKEN: &str = "test-token";

/// Test fixture for API testing with mock dependencies.
///
/// The worker is not started, so enqueued jobs stay in the queue where
/// tests can inspect them.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock platform - configure available courses
    pub platform: Arc<MockPlatform>,
    pub queue: Arc<SqliteJobQueue>,
    pub ledger: Arc<SqliteLedger>,
    /// Temporary directory for the database and the bucket
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::default();
        config.database.path = db_path.clone();
        config.storage.bucket_dir = temp_dir.path().join("bucket");
        config.storage.downloads_dir = temp_dir.path().join("downloads");
        config.worker.enabled = false;
        std::fs::create_dir_all(&config.storage.bucket_dir).expect("Failed to create bucket dir");

        let platform = Arc::new(MockPlatform::new());
        platform.require_token(TOKEN).await;

        let queue = Arc::new(SqliteJobQueue::new(&db_path).expect("Failed to create queue"));
        let ledger = Arc::new(SqliteLedger::new(&db_path).expect("Failed to create ledger"));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::clone(&ledger) as Arc<dyn MigrationLedger>,
            Arc::clone(&platform) as Arc<dyn PlatformClient>,
            None,
        ));

        Self {
            router: create_router(state),
            platform,
            queue,
            ledger,
            temp_dir,
        }
    }

    /// Write a file into the local bucket (served under `/content`).
    pub fn put_object(&self, key: &str, contents: &str) {
        let path = self.temp_dir.path().join("bucket").join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Send a GET request without credentials.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// Send a GET request with the platform token.
    pub async fn get_authed(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, Some(TOKEN)).await
    }

    /// Send a GET request with an arbitrary bearer token.
    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        self.request("GET", path, None, Some(token)).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), None).await
    }

    /// Send a POST request with JSON body and the platform token.
    pub async fn post_authed(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), Some(TOKEN)).await
    }

    /// Send a POST request with an empty body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, None).await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(token) = token {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
