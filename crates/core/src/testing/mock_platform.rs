//! Mock platform client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::manifest::CourseManifest;
use crate::platform::{CourseSummary, PlatformClient, PlatformError};

/// A recorded platform call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedPlatformCall {
    ListCourses { token: String },
    GetCourse { course_id: String, token: String },
}

/// Mock implementation of the PlatformClient trait.
///
/// Serves courses added with [`MockPlatform::add_course`]. Any token is
/// accepted unless one was set with [`MockPlatform::require_token`].
#[derive(Debug)]
pub struct MockPlatform {
    courses: Arc<RwLock<HashMap<String, CourseManifest>>>,
    calls: Arc<RwLock<Vec<RecordedPlatformCall>>>,
    required_token: Arc<RwLock<Option<String>>>,
    next_error: Arc<RwLock<Option<PlatformError>>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            courses: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            required_token: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn add_course(&self, course_id: &str, manifest: CourseManifest) {
        self.courses
            .write()
            .await
            .insert(course_id.to_string(), manifest);
    }

    /// Reject every token other than `token`.
    pub async fn require_token(&self, token: &str) {
        *self.required_token.write().await = Some(token.to_string());
    }

    /// Make the next call fail with the given error.
    pub async fn set_next_error(&self, error: PlatformError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_calls(&self) -> Vec<RecordedPlatformCall> {
        self.calls.read().await.clone()
    }

    async fn check(&self, token: &str) -> Result<(), PlatformError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        match self.required_token.read().await.as_deref() {
            Some(required) if required != token => Err(PlatformError::Unauthorized),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_courses(&self, token: &str) -> Result<Vec<CourseSummary>, PlatformError> {
        self.calls
            .write()
            .await
            .push(RecordedPlatformCall::ListCourses {
                token: token.to_string(),
            });
        self.check(token).await?;

        let mut courses: Vec<CourseSummary> = self
            .courses
            .read()
            .await
            .iter()
            .map(|(id, manifest)| CourseSummary {
                id: id.clone(),
                name: manifest.course.name.clone(),
                cover_image: None,
                product_id: None,
            })
            .collect();
        courses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(courses)
    }

    async fn get_course(
        &self,
        course_id: &str,
        token: &str,
    ) -> Result<CourseManifest, PlatformError> {
        self.calls.write().await.push(RecordedPlatformCall::GetCourse {
            course_id: course_id.to_string(),
            token: token.to_string(),
        });
        self.check(token).await?;

        self.courses
            .read()
            .await
            .get(course_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(course_id.to_string()))
    }
}
