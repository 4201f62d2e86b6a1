//! Course API handlers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use coursebridge_core::{
    course_prefix, decorate, manifest::validate_identifier, CourseManifest, CourseSummary,
    CourseView, JobPayload, MigrationUpdate, MIGRATION_JOB,
};

use super::handlers::{api_error, bearer_token, platform_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a migration
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateBody {
    pub course_id: String,
    pub workspace_id: String,
    /// Course document to migrate. Fetched from the platform when absent.
    pub manifest: Option<CourseManifest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResponse {
    pub success: bool,
    pub workspace_id: String,
    pub course_id: String,
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonsParams {
    pub workspace_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Courses the caller has access to on the platform
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let token = bearer_token(&headers)?;
    let courses = state
        .platform()
        .list_courses(&token)
        .await
        .map_err(platform_error)?;
    Ok(Json(courses))
}

/// Record a migration as downloading and enqueue its job
pub async fn migrate_course(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MigrateBody>,
) -> Result<(StatusCode, Json<MigrateResponse>), ApiError> {
    for (field, value) in [("courseId", &body.course_id), ("workspaceId", &body.workspace_id)] {
        validate_identifier(field, value)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    }

    let manifest = match body.manifest {
        Some(manifest) => manifest,
        None => {
            let token = bearer_token(&headers)?;
            state
                .platform()
                .get_course(&body.course_id, &token)
                .await
                .map_err(platform_error)?
        }
    };

    let payload = JobPayload::new(
        manifest,
        Some(body.workspace_id.clone()),
        Some(body.course_id.clone()),
    );
    let update = MigrationUpdate::started(
        payload.course_name(),
        format!("/content/{}", course_prefix(&payload)),
    );

    state
        .ledger()
        .upsert_migration(&body.workspace_id, &body.course_id, &update)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let value = serde_json::to_value(&payload)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let job = state
        .queue()
        .enqueue(MIGRATION_JOB, &value)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // Any job still running for this course stops owning the record here.
    state
        .ledger()
        .assign_job(&body.workspace_id, &body.course_id, &job.id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(
        job = %job.id,
        workspace = %body.workspace_id,
        course = %body.course_id,
        "Migration enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MigrateResponse {
            success: true,
            workspace_id: body.workspace_id,
            course_id: body.course_id,
            job_id: job.id,
        }),
    ))
}

/// Course structure with per-lesson migration state
pub async fn get_course_lessons(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    Query(params): Query<LessonsParams>,
    headers: HeaderMap,
) -> Result<Json<CourseView>, ApiError> {
    let token = bearer_token(&headers)?;
    let manifest = state
        .platform()
        .get_course(&course_id, &token)
        .await
        .map_err(platform_error)?;

    let statuses = match params.workspace_id.as_deref() {
        Some(ws) => state
            .ledger()
            .read_lesson_statuses(&course_id, ws)
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?,
        None => HashMap::new(),
    };

    Ok(Json(decorate(&manifest, &statuses)))
}
