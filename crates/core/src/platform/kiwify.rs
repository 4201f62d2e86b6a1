//! Kiwify viewer API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{CourseSummary, PlatformClient, PlatformError};
use crate::config::PlatformConfig;
use crate::manifest::CourseManifest;

pub struct KiwifyClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CoursesResponse {
    #[serde(default)]
    courses: Vec<Value>,
}

impl KiwifyClient {
    pub fn new(config: PlatformConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, token: &str) -> Result<Response, PlatformError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Kiwify GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json, text/plain, */*")
            .send()
            .await?;

        let status = response.status();
        if status == 401 || status == 403 {
            return Err(PlatformError::Unauthorized);
        }
        if status == 404 {
            return Err(PlatformError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }
}

/// Entries are either the course itself or wrap it in `course_info`.
fn summary_from_entry(entry: &Value) -> Option<CourseSummary> {
    let info = entry.get("course_info").unwrap_or(entry);
    let id = string_field(info, "id")?;

    Some(CourseSummary {
        id,
        name: string_field(info, "name").unwrap_or_default(),
        cover_image: string_field(info, "course_img").or_else(|| string_field(info, "cover_image")),
        product_id: string_field(entry, "product_id"),
    })
}

/// Reads a string or numeric field as a string.
fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PlatformClient for KiwifyClient {
    fn name(&self) -> &str {
        "kiwify"
    }

    async fn list_courses(&self, token: &str) -> Result<Vec<CourseSummary>, PlatformError> {
        let response = self.get("/viewer/schools/courses", token).await?;
        let body: CoursesResponse = response.json().await.map_err(|e| {
            PlatformError::ParseError(format!("Failed to parse course list: {}", e))
        })?;

        let courses: Vec<CourseSummary> =
            body.courses.iter().filter_map(summary_from_entry).collect();
        debug!("Kiwify returned {} courses", courses.len());
        Ok(courses)
    }

    async fn get_course(
        &self,
        course_id: &str,
        token: &str,
    ) -> Result<CourseManifest, PlatformError> {
        let path = format!(
            "/viewer/courses/{}/sections",
            urlencoding::encode(course_id)
        );
        let response = self.get(&path, token).await?;

        response.json().await.map_err(|e| {
            PlatformError::ParseError(format!("Failed to parse course {}: {}", course_id, e))
        })
    }
}
