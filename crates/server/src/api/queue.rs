//! Queue status and administrative cancellation.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use coursebridge_core::{CancelAllReport, QueueCounts, WorkerStatus};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    pub counts: QueueCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerStatus>,
}

pub async fn queue_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let counts = state
        .queue()
        .counts()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let worker = match state.worker() {
        Some(worker) => Some(worker.status().await),
        None => None,
    };

    Ok(Json(QueueStatusResponse { counts, worker }))
}

/// Remove every job and cancel every active migration
pub async fn cancel_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CancelAllReport>, ApiError> {
    let report = state
        .control()
        .cancel_all()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(
        jobs = report.jobs_removed,
        migrations = report.migrations_cancelled,
        "Queue cleared via API"
    );
    Ok(Json(report))
}
