//! Client for the course platform the catalogs are migrated from.

mod kiwify;

pub use kiwify::KiwifyClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::manifest::CourseManifest;

/// Errors that can occur when talking to the platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The token was rejected (401/403).
    #[error("Platform rejected the access token")]
    Unauthorized,

    #[error("Course not found: {0}")]
    NotFound(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// One entry of the user's course list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

/// Read access to a user's courses on the platform.
///
/// Every call carries the end user's bearer token; the service holds no
/// platform credentials of its own.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Name of the platform, for logging.
    fn name(&self) -> &str;

    /// Courses the token's owner has access to.
    async fn list_courses(&self, token: &str) -> Result<Vec<CourseSummary>, PlatformError>;

    /// Full course document, handed unchanged to the fetch executable.
    async fn get_course(
        &self,
        course_id: &str,
        token: &str,
    ) -> Result<CourseManifest, PlatformError>;
}
