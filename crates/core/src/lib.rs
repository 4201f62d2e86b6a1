pub mod catalog;
pub mod config;
pub mod control;
pub mod ledger;
pub mod manifest;
pub mod metrics;
pub mod platform;
pub mod queue;
pub mod storage;
pub mod supervisor;
pub mod testing;
pub mod worker;

pub use catalog::{decorate, CourseView, LessonView, ModuleView};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, SanitizedConfig, StorageBackend,
};
pub use control::{CancelAllReport, ControlError, QueueControl};
pub use ledger::{
    LedgerError, LessonState, LessonStatus, MigrationLedger, MigrationRecord, MigrationStatus,
    MigrationUpdate, SqliteLedger,
};
pub use manifest::{course_prefix, CourseManifest, JobPayload, StorageLayout};
pub use platform::{CourseSummary, KiwifyClient, PlatformClient, PlatformError};
pub use queue::{Job, JobQueue, JobState, QueueCounts, QueueError, SqliteJobQueue};
pub use storage::{
    FsObjectStore, HttpObjectStore, ObjectStore, StorageError, UploadPipeline, UploadSummary,
};
pub use supervisor::{MarkerParser, ProcessLauncher, ProcessSupervisor, TokioProcessLauncher};
pub use worker::{
    JobOutcome, MigrationWorker, WorkerConfig, WorkerError, WorkerStatus, MIGRATION_JOB,
};
