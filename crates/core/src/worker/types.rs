//! Types for the migration worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::QueueError;
use crate::storage::UploadError;

/// Errors that fail a migration job.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Malformed payload or missing identifiers.
    #[error("invalid job: {0}")]
    Validation(String),

    /// The fetch executable could not be started.
    #[error("failed to start fetch process: {0}")]
    ProcessSpawn(String),

    #[error("process exited with code {code}")]
    ProcessExit { code: i32 },

    /// Terminated by a signal or vanished without an exit code.
    #[error("process terminated without an exit code")]
    ProcessKilled,

    #[error("process timed out after {timeout_secs} seconds")]
    ProcessTimeout { timeout_secs: u64 },

    /// The closing upload failed.
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Scratch manifest or output directory could not be written.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Result of a processed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub course_name: String,
    pub lessons_total: usize,
    pub lessons_started: usize,
    pub lesson_dirs_uploaded: usize,
    pub remote_url: Option<String>,
    /// The migration was cancelled before the job started.
    pub skipped: bool,
}

/// A job currently being processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub job_id: String,
    pub course_name: String,
    pub workspace_id: Option<String>,
    pub course_id: Option<String>,
    pub lessons_total: usize,
    pub lessons_started: usize,
    pub current_lesson: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Current status of the worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub running: bool,
    pub concurrency: usize,
    pub active_jobs: Vec<ActiveJob>,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}
