//! Queue control plane: cancellation of pending and in-flight migrations.
//!
//! Cancellation only touches the queue and the ledger. A fetch process that
//! is already running keeps running; its job cannot overwrite the cancelled
//! record because terminal writes are conditional.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::ledger::{LedgerError, MigrationLedger, MigrationStatus};
use crate::metrics;
use crate::queue::{JobQueue, JobState, QueueError};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("No active migration for workspace {workspace_id}, course {course_id}")]
    NotFound {
        workspace_id: String,
        course_id: String,
    },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// What a cancel-all removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllReport {
    pub jobs_removed: usize,
    pub migrations_cancelled: usize,
    pub lessons_failed: usize,
}

/// Administrative operations over the queue and the ledger.
#[derive(Clone)]
pub struct QueueControl {
    queue: Arc<dyn JobQueue>,
    ledger: Arc<dyn MigrationLedger>,
}

impl QueueControl {
    pub fn new(queue: Arc<dyn JobQueue>, ledger: Arc<dyn MigrationLedger>) -> Self {
        Self { queue, ledger }
    }

    /// Empty the queue and cancel every queued or downloading migration.
    ///
    /// The queue is paused while it is cleaned so no loop claims a job
    /// halfway through, and resumed afterwards even if cleaning failed.
    pub fn cancel_all(&self) -> Result<CancelAllReport, ControlError> {
        self.queue.pause()?;
        let cleaned = self.clean_queue();
        if let Err(e) = self.queue.resume() {
            warn!("Failed to resume queue after cancel-all: {}", e);
        }
        let jobs_removed = cleaned?;

        let migrations_cancelled = self.ledger.cancel_migrations(MigrationStatus::active())?;
        let lessons_failed = self.ledger.fail_processing_lessons()?;

        metrics::CANCELLATIONS.with_label_values(&["all"]).inc();
        info!(
            jobs_removed,
            migrations_cancelled, lessons_failed, "Cancelled all migrations"
        );

        Ok(CancelAllReport {
            jobs_removed,
            migrations_cancelled,
            lessons_failed,
        })
    }

    /// Cancel one migration. Its queue job, if still waiting, is skipped
    /// when a worker claims it.
    pub fn cancel_one(&self, workspace_id: &str, course_id: &str) -> Result<(), ControlError> {
        if !self.ledger.cancel_migration(workspace_id, course_id)? {
            return Err(ControlError::NotFound {
                workspace_id: workspace_id.to_string(),
                course_id: course_id.to_string(),
            });
        }

        metrics::CANCELLATIONS.with_label_values(&["one"]).inc();
        info!(
            workspace = workspace_id,
            course = course_id,
            "Cancelled migration"
        );
        Ok(())
    }

    fn clean_queue(&self) -> Result<usize, QueueError> {
        let mut removed = 0;
        for state in [
            JobState::Waiting,
            JobState::Delayed,
            JobState::Active,
            JobState::Failed,
        ] {
            removed += self.queue.clean(state)?;
        }
        removed += self.queue.drain()?;
        Ok(removed)
    }
}
