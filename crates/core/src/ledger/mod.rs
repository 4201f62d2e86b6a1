//! Migration ledger: durable per-course and per-lesson migration status.
//!
//! The ledger is the single source of truth clients poll for progress. It is
//! written by the worker (progress and terminal status) and by the control
//! plane (cancellation). Rows are never deleted; a new migration request
//! overwrites the existing row for the same key.

mod sqlite;
mod types;

use std::collections::HashMap;

use thiserror::Error;

pub use sqlite::SqliteLedger;
pub use types::{
    LessonMigrationRecord, LessonState, LessonStatus, MigrationOutcome, MigrationRecord,
    MigrationStatus, MigrationUpdate,
};

/// Errors returned by ledger backends.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

/// Storage backend for migration status.
pub trait MigrationLedger: Send + Sync {
    /// Insert or fully overwrite the record for `(workspace_id, course_id)`.
    fn upsert_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
        update: &MigrationUpdate,
    ) -> Result<MigrationRecord, LedgerError>;

    /// Get a single record.
    fn get_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
    ) -> Result<Option<MigrationRecord>, LedgerError>;

    /// All records of a workspace, any status.
    fn list_migrations(&self, workspace_id: &str) -> Result<Vec<MigrationRecord>, LedgerError>;

    /// Record `job_id` as the owner of a `queued`/`downloading` record.
    fn assign_job(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
    ) -> Result<bool, LedgerError>;

    /// Raise progress of a `downloading` record owned by `job_id`. Never
    /// lowers it.
    ///
    /// Returns whether a row was updated.
    fn advance_progress(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
        progress: u8,
    ) -> Result<bool, LedgerError>;

    /// Move a `queued`/`downloading` record owned by `job_id` to a terminal
    /// status.
    ///
    /// Returns false when the record was already terminal (for example
    /// cancelled while the job ran) or now belongs to another job.
    fn finish_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
        outcome: &MigrationOutcome,
    ) -> Result<bool, LedgerError>;

    /// Bulk transition of every record in `statuses` to `cancelled`.
    fn cancel_migrations(&self, statuses: &[MigrationStatus]) -> Result<usize, LedgerError>;

    /// Cancel one non-terminal record. Returns false if none matched.
    fn cancel_migration(&self, workspace_id: &str, course_id: &str) -> Result<bool, LedgerError>;

    /// Insert or update a lesson row.
    fn upsert_lesson_status(
        &self,
        workspace_id: &str,
        course_id: &str,
        lesson_id: &str,
        status: LessonStatus,
        stream_url: Option<&str>,
    ) -> Result<(), LedgerError>;

    /// Flip every `processing` lesson to `error`.
    fn fail_processing_lessons(&self) -> Result<usize, LedgerError>;

    /// Lesson id to status for one course.
    fn read_lesson_statuses(
        &self,
        course_id: &str,
        workspace_id: &str,
    ) -> Result<HashMap<String, LessonState>, LedgerError>;
}
