//! Workspace migration status and cancellation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use coursebridge_core::{ControlError, MigrationRecord};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatusResponse {
    pub workspace_id: String,
    pub migrations: Vec<MigrationRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
    pub workspace_id: String,
    pub course_id: String,
}

/// Every migration of a workspace
pub async fn workspace_status(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Result<Json<WorkspaceStatusResponse>, ApiError> {
    let migrations = state
        .ledger()
        .list_migrations(&workspace_id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(WorkspaceStatusResponse {
        workspace_id,
        migrations,
    }))
}

/// Cancel one queued or downloading migration
pub async fn cancel_migration(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, course_id)): Path<(String, String)>,
) -> Result<Json<CancelResponse>, ApiError> {
    match state.control().cancel_one(&workspace_id, &course_id) {
        Ok(()) => Ok(Json(CancelResponse {
            cancelled: true,
            workspace_id,
            course_id,
        })),
        Err(e @ ControlError::NotFound { .. }) => {
            Err(api_error(StatusCode::NOT_FOUND, e.to_string()))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
