//! Migration worker lifecycle integration tests.
//!
//! These tests drive complete jobs through the worker with a scripted fetch
//! process and an in-memory object store:
//! queued -> downloading -> completed | error | cancelled

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use coursebridge_core::{
    ledger::{
        LedgerError, LessonState, LessonStatus, MigrationLedger, MigrationOutcome,
        MigrationRecord, MigrationStatus, MigrationUpdate, SqliteLedger,
    },
    manifest::{CourseManifest, JobPayload, StorageLayout},
    queue::{JobQueue, SqliteJobQueue},
    storage::{UploadPipeline, UPLOADED_MARKER},
    supervisor::{MarkerParser, ProcessSupervisor},
    testing::{fixtures, MockObjectStore, ScriptedLauncher},
    MigrationWorker, QueueControl, WorkerConfig, WorkerError, MIGRATION_JOB,
};

const WS: &str = "ws-1";
const COURSE: &str = "course-1";
const PREFIX: &str = "workspaces/ws-1/course-1";

/// Ledger wrapper that remembers every progress value the worker reports.
struct RecordingLedger {
    inner: SqliteLedger,
    progress: Mutex<Vec<u8>>,
}

impl RecordingLedger {
    fn new(inner: SqliteLedger) -> Self {
        Self {
            inner,
            progress: Mutex::new(Vec::new()),
        }
    }

    fn progress_reports(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }
}

impl MigrationLedger for RecordingLedger {
    fn upsert_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
        update: &MigrationUpdate,
    ) -> Result<MigrationRecord, LedgerError> {
        self.inner.upsert_migration(workspace_id, course_id, update)
    }

    fn get_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
    ) -> Result<Option<MigrationRecord>, LedgerError> {
        self.inner.get_migration(workspace_id, course_id)
    }

    fn list_migrations(&self, workspace_id: &str) -> Result<Vec<MigrationRecord>, LedgerError> {
        self.inner.list_migrations(workspace_id)
    }

    fn assign_job(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
    ) -> Result<bool, LedgerError> {
        self.inner.assign_job(workspace_id, course_id, job_id)
    }

    fn advance_progress(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
        progress: u8,
    ) -> Result<bool, LedgerError> {
        self.progress.lock().unwrap().push(progress);
        self.inner
            .advance_progress(workspace_id, course_id, job_id, progress)
    }

    fn finish_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
        outcome: &MigrationOutcome,
    ) -> Result<bool, LedgerError> {
        if let Some(progress) = outcome.progress {
            self.progress.lock().unwrap().push(progress);
        }
        self.inner
            .finish_migration(workspace_id, course_id, job_id, outcome)
    }

    fn cancel_migrations(&self, statuses: &[MigrationStatus]) -> Result<usize, LedgerError> {
        self.inner.cancel_migrations(statuses)
    }

    fn cancel_migration(&self, workspace_id: &str, course_id: &str) -> Result<bool, LedgerError> {
        self.inner.cancel_migration(workspace_id, course_id)
    }

    fn upsert_lesson_status(
        &self,
        workspace_id: &str,
        course_id: &str,
        lesson_id: &str,
        status: LessonStatus,
        stream_url: Option<&str>,
    ) -> Result<(), LedgerError> {
        self.inner
            .upsert_lesson_status(workspace_id, course_id, lesson_id, status, stream_url)
    }

    fn fail_processing_lessons(&self) -> Result<usize, LedgerError> {
        self.inner.fail_processing_lessons()
    }

    fn read_lesson_statuses(
        &self,
        course_id: &str,
        workspace_id: &str,
    ) -> Result<HashMap<String, LessonState>, LedgerError> {
        self.inner.read_lesson_statuses(course_id, workspace_id)
    }
}

/// Test helper holding every collaborator of the worker.
struct TestHarness {
    queue: Arc<SqliteJobQueue>,
    ledger: Arc<RecordingLedger>,
    store: Arc<MockObjectStore>,
    layout: StorageLayout,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let queue = Arc::new(SqliteJobQueue::new(&db_path).expect("Failed to create queue"));
        let ledger = Arc::new(RecordingLedger::new(
            SqliteLedger::new(&db_path).expect("Failed to create ledger"),
        ));
        let layout = StorageLayout::new(
            temp_dir.path().join("downloads"),
            temp_dir.path().join("temp"),
        );

        Self {
            queue,
            ledger,
            store: Arc::new(MockObjectStore::new()),
            layout,
            _temp_dir: temp_dir,
        }
    }

    fn worker(&self, launcher: &ScriptedLauncher) -> MigrationWorker {
        let config = WorkerConfig::default()
            .with_poll_interval_ms(20)
            .with_settle_delay_ms(0);
        let supervisor = ProcessSupervisor::new(Arc::new(launcher.clone()), MarkerParser::default());
        let uploads = UploadPipeline::new(self.store.clone(), 4);

        MigrationWorker::new(
            config,
            Arc::clone(&self.queue) as Arc<dyn JobQueue>,
            Arc::clone(&self.ledger) as Arc<dyn MigrationLedger>,
            supervisor,
            uploads,
            self.layout.clone(),
        )
    }

    /// Record the migration as the HTTP surface does, then enqueue it.
    fn request_migration(&self, payload: &JobPayload) -> String {
        if let Some((ws, course)) = payload.ledger_key() {
            self.ledger
                .upsert_migration(
                    ws,
                    course,
                    &MigrationUpdate::started(payload.course_name(), "/content/x"),
                )
                .expect("Failed to record migration");
        }
        let value = serde_json::to_value(payload).expect("Failed to serialize payload");
        let job_id = self
            .queue
            .enqueue(MIGRATION_JOB, &value)
            .expect("Failed to enqueue")
            .id;
        if let Some((ws, course)) = payload.ledger_key() {
            self.ledger
                .assign_job(ws, course, &job_id)
                .expect("Failed to assign job");
        }
        job_id
    }

    fn record(&self) -> MigrationRecord {
        self.ledger
            .get_migration(WS, COURSE)
            .expect("Failed to read ledger")
            .expect("Record missing")
    }

    fn lesson_statuses(&self) -> HashMap<String, LessonState> {
        self.ledger
            .read_lesson_statuses(COURSE, WS)
            .expect("Failed to read lessons")
    }

    fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.layout.scratch_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn two_by_two_payload() -> (CourseManifest, JobPayload) {
    let manifest = fixtures::with_lesson_ids(fixtures::two_by_two_course("Rust Basics"), COURSE);
    let payload = fixtures::workspace_payload(manifest.clone(), WS, COURSE);
    (manifest, payload)
}

#[tokio::test]
async fn test_full_course_migrates_with_progress() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);

    let job_id = harness.request_migration(&payload);
    let outcome = worker
        .process_next()
        .await
        .expect("Job failed")
        .expect("No job claimed");

    assert_eq!(outcome.job_id, job_id);
    assert_eq!(outcome.lessons_total, 4);
    assert_eq!(outcome.lessons_started, 4);
    assert_eq!(outcome.lesson_dirs_uploaded, 4);
    assert!(!outcome.skipped);

    assert_eq!(harness.ledger.progress_reports(), vec![24, 48, 71, 95, 100]);

    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(
        record.remote_url.as_deref(),
        Some("https://cdn.test/workspaces/ws-1/course-1")
    );

    // Every lesson directory uploaded exactly once.
    let mut keys = harness.store.uploaded_keys().await;
    keys.sort();
    assert_eq!(
        keys,
        vec![
            format!("{}/0_Getting_Started/0_Welcome/video.mp4", PREFIX),
            format!("{}/0_Getting_Started/1_Setup/video.mp4", PREFIX),
            format!("{}/1_Deep_Dive/0_Ownership/video.mp4", PREFIX),
            format!("{}/1_Deep_Dive/1_Lifetimes/video.mp4", PREFIX),
        ]
    );

    let lessons = harness.lesson_statuses();
    assert_eq!(lessons.len(), 4);
    for state in lessons.values() {
        assert_eq!(state.processing_status, LessonStatus::Completed);
    }
    assert_eq!(
        lessons["course-1-l1"].stream_url.as_deref(),
        Some("https://cdn.test/workspaces/ws-1/course-1/0_Getting_Started/0_Welcome")
    );

    let lesson_dir = harness
        .layout
        .output_dir(PREFIX)
        .join("1_Deep_Dive")
        .join("1_Lifetimes");
    assert!(lesson_dir.join(UPLOADED_MARKER).exists());

    let job = harness.queue.get(&job_id).unwrap().unwrap();
    assert_eq!(job.state.as_str(), "completed");
    assert_eq!(harness.scratch_files(), 0);
}

#[tokio::test]
async fn test_scratch_manifest_is_handed_to_the_process() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    worker.process_next().await.unwrap().unwrap();

    let launches = launcher.recorded_launches().await;
    assert_eq!(launches.len(), 1);
    let launch = &launches[0];
    assert!(launch.command.output_dir.ends_with(PREFIX));

    let written: serde_json::Value =
        serde_json::from_str(launch.manifest.as_deref().expect("Manifest unreadable")).unwrap();
    assert_eq!(written["workspaceId"], WS);
    assert_eq!(written["courseId"], COURSE);
    assert_eq!(written["course"]["name"], "Rust Basics");

    assert!(!launch.command.manifest_path.exists());
}

#[tokio::test]
async fn test_non_zero_exit_fails_job() {
    let harness = TestHarness::new();
    let (_, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::new()
        .stdout("Module 'Getting Started'")
        .stdout("Starting download of 'Welcome'")
        .write_file("0_Getting_Started/0_Welcome/video.mp4", b"partial")
        .exit(1);
    let worker = harness.worker(&launcher);

    let job_id = harness.request_migration(&payload);
    let err = worker.process_next().await.unwrap_err();
    assert!(matches!(err, WorkerError::ProcessExit { code: 1 }));

    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Error);
    assert_eq!(record.progress, 24);
    assert!(record.error.unwrap().contains('1'));

    // No closing upload after a failure.
    assert_eq!(harness.store.put_count().await, 0);

    let job = harness.queue.get(&job_id).unwrap().unwrap();
    assert_eq!(job.state.as_str(), "failed");
    assert!(job.error.is_some());
    assert_eq!(harness.scratch_files(), 0);
}

#[tokio::test]
async fn test_killed_process_fails_job() {
    let harness = TestHarness::new();
    let (_, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::new().signal();
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    let err = worker.process_next().await.unwrap_err();
    assert!(matches!(err, WorkerError::ProcessKilled));
    assert_eq!(harness.record().status, MigrationStatus::Error);
}

#[tokio::test]
async fn test_empty_course_completes() {
    let harness = TestHarness::new();
    let payload = fixtures::workspace_payload(CourseManifest::new("Empty"), WS, COURSE);
    let launcher = ScriptedLauncher::new().exit(0);
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    let outcome = worker.process_next().await.unwrap().unwrap();

    assert_eq!(outcome.lessons_total, 0);
    assert_eq!(outcome.lesson_dirs_uploaded, 0);
    assert_eq!(harness.ledger.progress_reports(), vec![100]);

    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(harness.store.put_count().await, 0);
}

#[tokio::test]
async fn test_spawn_failure_marks_error() {
    let harness = TestHarness::new();
    let (_, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::new().fail_spawn("kiwifyDownload: not found");
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    let err = worker.process_next().await.unwrap_err();
    assert!(matches!(err, WorkerError::ProcessSpawn(_)));

    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Error);
    assert!(record.error.unwrap().contains("not found"));
    assert_eq!(harness.queue.counts().unwrap().failed, 1);
    assert_eq!(harness.scratch_files(), 0);
}

#[tokio::test]
async fn test_legacy_job_leaves_ledger_untouched() {
    let harness = TestHarness::new();
    let manifest = CourseManifest::new("Legacy Course").with_module("Only", &["First", "Second"]);
    let payload = JobPayload::new(manifest.clone(), None, None);
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    let outcome = worker.process_next().await.unwrap().unwrap();
    assert_eq!(outcome.lesson_dirs_uploaded, 2);

    assert!(harness.ledger.progress_reports().is_empty());
    assert!(harness.ledger.list_migrations(WS).unwrap().is_empty());
    assert_eq!(harness.store.count_with_prefix("Legacy_Course/").await, 2);
}

#[tokio::test]
async fn test_invalid_payload_is_rejected() {
    let harness = TestHarness::new();
    let launcher = ScriptedLauncher::new();
    let worker = harness.worker(&launcher);

    harness
        .ledger
        .upsert_migration(WS, COURSE, &MigrationUpdate::started("X", "/content/x"))
        .unwrap();
    let payload = serde_json::json!({
        "course": {"name": "Bad", "modules": "not a list"},
        "workspaceId": WS,
        "courseId": COURSE,
    });
    let job = harness.queue.enqueue(MIGRATION_JOB, &payload).unwrap();
    harness.ledger.assign_job(WS, COURSE, &job.id).unwrap();

    let err = worker.process_next().await.unwrap_err();
    assert!(matches!(err, WorkerError::Validation(_)));
    assert_eq!(harness.record().status, MigrationStatus::Error);
    assert_eq!(launcher.launch_count().await, 0);
}

#[tokio::test]
async fn test_incremental_upload_failure_does_not_fail_job() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    harness.store.fail_keys_containing("0_Welcome").await;
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    let outcome = worker.process_next().await.unwrap().unwrap();
    assert_eq!(outcome.lesson_dirs_uploaded, 3);

    assert_eq!(harness.record().status, MigrationStatus::Completed);
    let lessons = harness.lesson_statuses();
    assert_eq!(lessons["course-1-l1"].processing_status, LessonStatus::Error);
    assert_eq!(lessons["course-1-l2"].processing_status, LessonStatus::Completed);
}

#[tokio::test]
async fn test_final_upload_failure_fails_job() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    harness.store.fail_keys_containing("1_Lifetimes").await;
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    let err = worker.process_next().await.unwrap_err();
    assert!(matches!(err, WorkerError::Upload(_)));

    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Error);
    assert_eq!(record.progress, 95);
    assert_eq!(
        harness.lesson_statuses()["course-1-l4"].processing_status,
        LessonStatus::Error
    );
}

#[tokio::test]
async fn test_cancelled_record_skips_job() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);
    let control = QueueControl::new(
        Arc::clone(&harness.queue) as Arc<dyn JobQueue>,
        Arc::clone(&harness.ledger) as Arc<dyn MigrationLedger>,
    );

    let job_id = harness.request_migration(&payload);
    control.cancel_one(WS, COURSE).unwrap();

    let outcome = worker.process_next().await.unwrap().unwrap();
    assert!(outcome.skipped);
    assert_eq!(launcher.launch_count().await, 0);
    assert_eq!(harness.record().status, MigrationStatus::Cancelled);
    assert_eq!(
        harness.queue.get(&job_id).unwrap().unwrap().state.as_str(),
        "completed"
    );
}

#[tokio::test]
async fn test_cancel_all_clears_pending_jobs() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    let other = fixtures::workspace_payload(CourseManifest::new("Other"), WS, "course-2");
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);
    let control = QueueControl::new(
        Arc::clone(&harness.queue) as Arc<dyn JobQueue>,
        Arc::clone(&harness.ledger) as Arc<dyn MigrationLedger>,
    );

    harness.request_migration(&payload);
    harness.request_migration(&other);

    let report = control.cancel_all().unwrap();
    assert_eq!(report.jobs_removed, 2);
    assert_eq!(report.migrations_cancelled, 2);

    assert!(worker.process_next().await.unwrap().is_none());
    assert_eq!(launcher.launch_count().await, 0);
    for record in harness.ledger.list_migrations(WS).unwrap() {
        assert_eq!(record.status, MigrationStatus::Cancelled);
    }
}

#[tokio::test]
async fn test_cancel_during_run_is_not_overwritten() {
    let harness = TestHarness::new();
    let (_, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::new()
        .stdout("Module 'Getting Started'")
        .stdout("Starting download of 'Welcome'")
        .write_file("0_Getting_Started/0_Welcome/video.mp4", b"video")
        .sleep_ms(300)
        .stdout("Starting download of 'Setup'")
        .write_file("0_Getting_Started/1_Setup/video.mp4", b"video")
        .exit(0);
    let worker = Arc::new(harness.worker(&launcher));

    harness.request_migration(&payload);
    let running = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.process_next().await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while harness.record().progress == 0 {
        assert!(tokio::time::Instant::now() < deadline, "progress never advanced");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(harness.ledger.cancel_migration(WS, COURSE).unwrap());

    let outcome = running.await.unwrap().unwrap().unwrap();
    assert!(!outcome.skipped);

    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Cancelled);
    assert!(record.progress < 100);
}

#[tokio::test]
async fn test_repeated_lesson_marker_keeps_uploads_aligned() {
    let harness = TestHarness::new();
    let (_, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::new()
        .stdout("Module 'Getting Started'")
        .stdout("Starting download of 'Welcome'")
        .write_file("0_Getting_Started/0_Welcome/video.mp4", b"video")
        .stdout("Starting download of 'Welcome'")
        .stdout("Starting download of 'Setup'")
        .write_file("0_Getting_Started/1_Setup/video.mp4", b"video")
        .stdout("Module 'Deep Dive'")
        .stdout("Starting download of 'Ownership'")
        .write_file("1_Deep_Dive/0_Ownership/video.mp4", b"video")
        .stdout("Starting download of 'Lifetimes'")
        .write_file("1_Deep_Dive/1_Lifetimes/video.mp4", b"video")
        .exit(0);
    let worker = harness.worker(&launcher);

    harness.request_migration(&payload);
    let outcome = worker.process_next().await.unwrap().unwrap();

    assert_eq!(outcome.lessons_started, 4);
    assert_eq!(outcome.lesson_dirs_uploaded, 4);
    assert_eq!(harness.ledger.progress_reports(), vec![24, 48, 71, 95, 100]);

    // The last lesson still gets the closing upload.
    assert_eq!(
        harness
            .store
            .count_with_prefix(&format!("{}/1_Deep_Dive/1_Lifetimes/", PREFIX))
            .await,
        1
    );
    let lessons = harness.lesson_statuses();
    assert_eq!(lessons.len(), 4);
    for state in lessons.values() {
        assert_eq!(state.processing_status, LessonStatus::Completed);
    }
}

#[tokio::test]
async fn test_new_request_while_old_job_runs_is_not_overwritten() {
    let harness = TestHarness::new();
    let (_, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::new()
        .stdout("Module 'Getting Started'")
        .stdout("Starting download of 'Welcome'")
        .write_file("0_Getting_Started/0_Welcome/video.mp4", b"video")
        .sleep_ms(300)
        .stdout("Starting download of 'Setup'")
        .write_file("0_Getting_Started/1_Setup/video.mp4", b"video")
        .exit(0);
    let worker = Arc::new(harness.worker(&launcher));

    let first_job = harness.request_migration(&payload);
    let running = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.process_next().await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while harness.record().progress == 0 {
        assert!(tokio::time::Instant::now() < deadline, "progress never advanced");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The course is requested again while the first fetch is stuck.
    let second_job = harness.request_migration(&payload);

    let outcome = running.await.unwrap().unwrap().unwrap();
    assert_eq!(outcome.job_id, first_job);

    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Downloading);
    assert_eq!(record.progress, 0);
    assert!(record.remote_url.is_none());
    assert_eq!(record.job_id.as_deref(), Some(second_job.as_str()));

    // The new job owns the lifecycle and completes it.
    let outcome = worker.process_next().await.unwrap().unwrap();
    assert_eq!(outcome.job_id, second_job);
    assert!(!outcome.skipped);
    let record = harness.record();
    assert_eq!(record.status, MigrationStatus::Completed);
    assert_eq!(record.job_id.as_deref(), Some(second_job.as_str()));
}

#[tokio::test]
async fn test_superseded_queued_job_is_skipped() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);

    let first_job = harness.request_migration(&payload);
    let second_job = harness.request_migration(&payload);

    let outcome = worker.process_next().await.unwrap().unwrap();
    assert_eq!(outcome.job_id, first_job);
    assert!(outcome.skipped);
    assert_eq!(launcher.launch_count().await, 0);

    let outcome = worker.process_next().await.unwrap().unwrap();
    assert_eq!(outcome.job_id, second_job);
    assert!(!outcome.skipped);
    assert_eq!(launcher.launch_count().await, 1);
    assert_eq!(harness.record().status, MigrationStatus::Completed);
}

#[tokio::test]
async fn test_started_worker_drains_queue() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();
    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);

    worker.start().await;
    assert!(worker.is_running());
    harness.request_migration(&payload);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.record().status != MigrationStatus::Completed {
        assert!(tokio::time::Instant::now() < deadline, "job never completed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Acknowledged after the ledger is written.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while harness.queue.counts().unwrap().completed != 1 {
        assert!(tokio::time::Instant::now() < deadline, "job never acknowledged");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let status = worker.status().await;
    assert_eq!(status.jobs_completed, 1);
    assert!(status.active_jobs.is_empty());

    worker.stop().await;
    assert!(!worker.is_running());
}

#[tokio::test]
async fn test_stalled_jobs_are_recovered_on_start() {
    let harness = TestHarness::new();
    let (manifest, payload) = two_by_two_payload();

    harness.request_migration(&payload);
    // A previous process claimed the job and died.
    harness.queue.claim_next().unwrap().unwrap();

    let launcher = ScriptedLauncher::for_manifest(&manifest);
    let worker = harness.worker(&launcher);
    worker.start().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.record().status != MigrationStatus::Completed {
        assert!(tokio::time::Instant::now() < deadline, "stalled job never re-run");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    worker.stop().await;
    assert_eq!(launcher.launch_count().await, 1);
}
