//! Durable job queue.
//!
//! Jobs survive process restarts. A claimed job is `active` until the worker
//! acknowledges it; `recover_stalled` puts jobs left active by a crashed
//! process back in line. Workers are woken through a [`Notify`] when work is
//! enqueued and also poll, so a missed wakeup only costs one poll interval.

mod sqlite;
mod types;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

pub use sqlite::SqliteJobQueue;
pub use types::{Job, JobState, QueueCounts};

/// Errors returned by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt job row: {0}")]
    Corrupt(String),

    #[error("Job not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Database(e.to_string())
    }
}

/// Storage backend for jobs.
pub trait JobQueue: Send + Sync {
    /// Add a job that is immediately claimable.
    fn enqueue(&self, name: &str, payload: &serde_json::Value) -> Result<Job, QueueError>;

    /// Add a job that becomes claimable after `delay`.
    fn enqueue_delayed(
        &self,
        name: &str,
        payload: &serde_json::Value,
        delay: Duration,
    ) -> Result<Job, QueueError>;

    /// Claim the oldest eligible job and mark it `active`.
    ///
    /// Returns `None` when the queue is empty or paused.
    fn claim_next(&self) -> Result<Option<Job>, QueueError>;

    /// Acknowledge success. Returns false if the job no longer exists.
    fn complete(&self, id: &str) -> Result<bool, QueueError>;

    /// Acknowledge failure. Returns false if the job no longer exists.
    fn fail(&self, id: &str, error: &str) -> Result<bool, QueueError>;

    fn pause(&self) -> Result<(), QueueError>;

    fn resume(&self) -> Result<(), QueueError>;

    fn is_paused(&self) -> Result<bool, QueueError>;

    /// Delete every job in the given state.
    fn clean(&self, state: JobState) -> Result<usize, QueueError>;

    /// Delete every waiting and delayed job.
    fn drain(&self) -> Result<usize, QueueError>;

    fn counts(&self) -> Result<QueueCounts, QueueError>;

    fn get(&self, id: &str) -> Result<Option<Job>, QueueError>;

    /// Move jobs left `active` by a previous process back to `waiting`.
    fn recover_stalled(&self) -> Result<usize, QueueError>;

    /// Signalled whenever new work may be claimable.
    fn notifier(&self) -> Arc<Notify>;
}
