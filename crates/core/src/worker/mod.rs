//! Migration worker.
//!
//! Claims course migration jobs from the queue, runs the fetch executable
//! for each one, follows its progress markers and uploads finished lessons
//! to object storage while the fetch continues.

mod config;
mod runner;
mod tracker;
mod types;

pub use config::WorkerConfig;
pub use runner::{MigrationWorker, MIGRATION_JOB};
pub use tracker::{download_progress, LessonStep, LessonTracker, DOWNLOAD_PROGRESS_CAP};
pub use types::{ActiveJob, JobOutcome, WorkerError, WorkerStatus};
