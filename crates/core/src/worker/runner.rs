//! Migration worker implementation.
//!
//! Each worker loop claims one job, drives the fetch process to completion
//! and acknowledges the job before claiming the next one. Lesson
//! directories are uploaded while the fetch keeps running; only the closing
//! upload is awaited.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ledger::{
    LessonStatus, MigrationLedger, MigrationOutcome, MigrationStatus, MigrationUpdate,
};
use crate::manifest::{
    course_prefix, join_relative, validate_identifier, JobPayload, LessonLocation, StorageLayout,
};
use crate::metrics;
use crate::queue::{Job, JobQueue};
use crate::storage::{UploadError, UploadPipeline, UploadSummary};
use crate::supervisor::{FetchCommand, ProcessSupervisor, SupervisorEvent};

use super::config::WorkerConfig;
use super::tracker::LessonTracker;
use super::types::{ActiveJob, JobOutcome, WorkerError, WorkerStatus};

/// Queue job name used for course migrations.
pub const MIGRATION_JOB: &str = "download-course";

/// State shared by every worker loop.
struct WorkerShared {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    ledger: Arc<dyn MigrationLedger>,
    supervisor: ProcessSupervisor,
    uploads: UploadPipeline,
    layout: StorageLayout,
    active: RwLock<HashMap<String, ActiveJob>>,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

/// Everything a lesson upload needs, shared with spawned upload tasks.
struct UploadContext {
    job_id: String,
    uploads: UploadPipeline,
    ledger: Arc<dyn MigrationLedger>,
    ledger_key: Option<(String, String)>,
    output_dir: PathBuf,
    prefix: String,
    dirs_uploaded: AtomicUsize,
}

/// What the fetch phase produced.
struct FetchResult {
    lessons_started: usize,
    lesson_dirs_uploaded: usize,
}

/// The migration worker - drains the job queue.
pub struct MigrationWorker {
    shared: Arc<WorkerShared>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MigrationWorker {
    /// Create a new worker.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn JobQueue>,
        ledger: Arc<dyn MigrationLedger>,
        supervisor: ProcessSupervisor,
        uploads: UploadPipeline,
        layout: StorageLayout,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shared: Arc::new(WorkerShared {
                config,
                queue,
                ledger,
                supervisor,
                uploads,
                layout,
                active: RwLock::new(HashMap::new()),
                jobs_completed: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the worker loops (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker already running");
            return;
        }

        info!(
            concurrency = self.shared.config.concurrency,
            launcher = self.shared.supervisor.launcher_name(),
            "Starting migration worker"
        );

        // Jobs left active by a previous process are re-run.
        match self.shared.queue.recover_stalled() {
            Ok(0) => {}
            Ok(n) => info!("Recovered {} stalled jobs", n),
            Err(e) => error!("Failed to recover stalled jobs: {}", e),
        }

        for index in 0..self.shared.config.concurrency.max(1) {
            self.spawn_loop(index);
        }

        info!("Migration worker started");
    }

    /// Stop the worker gracefully.
    ///
    /// Loops exit after their current job; running fetch processes are not
    /// interrupted.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker not running");
            return;
        }

        info!("Stopping migration worker");
        let _ = self.shutdown_tx.send(());

        // Give idle loops a moment to observe the signal
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Migration worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current worker status.
    pub async fn status(&self) -> WorkerStatus {
        let mut active_jobs: Vec<ActiveJob> =
            self.shared.active.read().await.values().cloned().collect();
        active_jobs.sort_by_key(|job| job.started_at);

        WorkerStatus {
            running: self.is_running(),
            concurrency: self.shared.config.concurrency,
            active_jobs,
            jobs_completed: self.shared.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.shared.jobs_failed.load(Ordering::Relaxed),
        }
    }

    /// Claim, process and acknowledge one job, if any is available.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, WorkerError> {
        let Some(job) = self.shared.queue.claim_next()? else {
            return Ok(None);
        };
        self.shared.run_claimed(&job).await.map(Some)
    }

    /// Process one job without touching its queue state.
    pub async fn process_job(&self, job: &Job) -> Result<JobOutcome, WorkerError> {
        self.shared.process_job(job).await
    }

    fn spawn_loop(&self, index: usize) {
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let notify = shared.queue.notifier();
        let poll = Duration::from_millis(shared.config.poll_interval_ms.max(10));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(worker = index, "Worker loop started");
            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                match shared.queue.claim_next() {
                    Ok(Some(job)) => {
                        // Errors are already logged and recorded.
                        let _ = shared.run_claimed(&job).await;
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(worker = index, "Failed to claim job: {}", e),
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(worker = index, "Worker loop received shutdown signal");
                        break;
                    }
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(poll) => {}
                }
            }
            info!(worker = index, "Worker loop stopped");
        });
    }
}

impl WorkerShared {
    /// Process a claimed job and acknowledge it in the queue.
    async fn run_claimed(&self, job: &Job) -> Result<JobOutcome, WorkerError> {
        let started = Instant::now();
        let result = self.process_job(job).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(outcome) => {
                let label = if outcome.skipped { "skipped" } else { "completed" };
                metrics::JOBS_TOTAL.with_label_values(&[label]).inc();
                metrics::JOB_DURATION
                    .with_label_values(&[label])
                    .observe(elapsed);
                self.jobs_completed.fetch_add(1, Ordering::Relaxed);

                match self.queue.complete(&job.id) {
                    Ok(true) => {}
                    Ok(false) => debug!(job = %job.id, "Job was removed from the queue while running"),
                    Err(e) => warn!(job = %job.id, "Failed to acknowledge job: {}", e),
                }
            }
            Err(e) => {
                metrics::JOBS_TOTAL.with_label_values(&["failed"]).inc();
                metrics::JOB_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed);
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);

                match self.queue.fail(&job.id, &e.to_string()) {
                    Ok(true) => {}
                    Ok(false) => debug!(job = %job.id, "Job was removed from the queue while running"),
                    Err(qe) => warn!(job = %job.id, "Failed to record job failure: {}", qe),
                }
            }
        }

        result
    }

    async fn process_job(&self, job: &Job) -> Result<JobOutcome, WorkerError> {
        let payload = match parse_payload(job) {
            Ok(payload) => payload,
            Err(e) => {
                error!(job = %job.id, "Rejecting job: {}", e);
                if let Some((ws, course)) = raw_ledger_key(&job.payload) {
                    self.record_failure(&job.id, &ws, &course, &e);
                }
                return Err(e);
            }
        };

        let course_name = payload.course_name().to_string();
        let prefix = course_prefix(&payload);
        let ledger_key = payload
            .ledger_key()
            .map(|(ws, course)| (ws.to_string(), course.to_string()));

        info!(
            job = %job.id,
            course = %course_name,
            workspace = payload.workspace_id.as_deref().unwrap_or("N/A"),
            lessons = payload.manifest.total_lessons(),
            "Processing migration job"
        );

        if let Some((ws, course)) = &ledger_key {
            let skip_reason = match self.ledger.get_migration(ws, course) {
                Ok(Some(record)) if record.status == MigrationStatus::Cancelled => {
                    Some("Migration was cancelled before start, skipping job")
                }
                Ok(Some(record))
                    if record.job_id.as_ref().is_some_and(|owner| *owner != job.id) =>
                {
                    Some("Migration was requested again by a newer job, skipping job")
                }
                Ok(_) => None,
                Err(e) => {
                    warn!(job = %job.id, "Failed to read migration record: {}", e);
                    None
                }
            };

            if let Some(reason) = skip_reason {
                info!(job = %job.id, "{}", reason);
                return Ok(JobOutcome {
                    job_id: job.id.clone(),
                    course_name,
                    lessons_total: payload.manifest.total_lessons(),
                    lessons_started: 0,
                    lesson_dirs_uploaded: 0,
                    remote_url: None,
                    skipped: true,
                });
            }

            let update = MigrationUpdate::started(&course_name, format!("/content/{}", prefix))
                .with_job_id(&job.id);
            if let Err(e) = self.ledger.upsert_migration(ws, course, &update) {
                warn!(job = %job.id, "Failed to mark migration as downloading: {}", e);
            }
        }

        self.active.write().await.insert(
            job.id.clone(),
            ActiveJob {
                job_id: job.id.clone(),
                course_name: course_name.clone(),
                workspace_id: payload.workspace_id.clone(),
                course_id: payload.course_id.clone(),
                lessons_total: payload.manifest.total_lessons(),
                lessons_started: 0,
                current_lesson: None,
                started_at: Utc::now(),
            },
        );

        let scratch = self.layout.scratch_file(&course_name, &job.id);
        let output_dir = self.layout.output_dir(&prefix);

        let result = match self.prepare(&payload, &scratch, &output_dir).await {
            Ok(()) => {
                self.run_fetch(job, &payload, &prefix, &scratch, &output_dir, &ledger_key)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(job = %job.id, "Failed to remove scratch manifest: {}", e);
            }
        }
        self.active.write().await.remove(&job.id);

        match result {
            Ok(fetch) => {
                let remote_url = self.uploads.public_url(&prefix);
                if let Some((ws, course)) = &ledger_key {
                    match self
                        .ledger
                        .finish_migration(
                            ws,
                            course,
                            &job.id,
                            &MigrationOutcome::completed(&remote_url),
                        )
                    {
                        Ok(true) => {}
                        Ok(false) => info!(
                            job = %job.id,
                            "Migration was cancelled or re-requested while running"
                        ),
                        Err(e) => warn!(job = %job.id, "Failed to mark migration completed: {}", e),
                    }
                }

                info!(
                    job = %job.id,
                    course = %course_name,
                    lessons = fetch.lessons_started,
                    remote_url = %remote_url,
                    "Migration completed"
                );

                Ok(JobOutcome {
                    job_id: job.id.clone(),
                    course_name,
                    lessons_total: payload.manifest.total_lessons(),
                    lessons_started: fetch.lessons_started,
                    lesson_dirs_uploaded: fetch.lesson_dirs_uploaded,
                    remote_url: Some(remote_url),
                    skipped: false,
                })
            }
            Err(e) => {
                error!(job = %job.id, course = %course_name, "Migration failed: {}", e);
                if let Some((ws, course)) = &ledger_key {
                    self.record_failure(&job.id, ws, course, &e);
                }
                Err(e)
            }
        }
    }

    /// Write the scratch manifest and create the output directory.
    async fn prepare(
        &self,
        payload: &JobPayload,
        scratch: &Path,
        output_dir: &Path,
    ) -> Result<(), WorkerError> {
        if let Some(parent) = scratch.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WorkerError::Persistence(format!("create {}: {}", parent.display(), e))
            })?;
        }

        let json = serde_json::to_vec_pretty(payload)
            .map_err(|e| WorkerError::Persistence(format!("serialize manifest: {}", e)))?;
        tokio::fs::write(scratch, json).await.map_err(|e| {
            WorkerError::Persistence(format!("write {}: {}", scratch.display(), e))
        })?;

        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            WorkerError::Persistence(format!("create {}: {}", output_dir.display(), e))
        })?;

        Ok(())
    }

    async fn run_fetch(
        &self,
        job: &Job,
        payload: &JobPayload,
        prefix: &str,
        scratch: &Path,
        output_dir: &Path,
        ledger_key: &Option<(String, String)>,
    ) -> Result<FetchResult, WorkerError> {
        let ctx = Arc::new(UploadContext {
            job_id: job.id.clone(),
            uploads: self.uploads.clone(),
            ledger: Arc::clone(&self.ledger),
            ledger_key: ledger_key.clone(),
            output_dir: output_dir.to_path_buf(),
            prefix: prefix.to_string(),
            dirs_uploaded: AtomicUsize::new(0),
        });

        let mut tracker = LessonTracker::new(&payload.manifest);
        let mut uploaded: HashSet<String> = HashSet::new();
        let mut pending: Vec<JoinHandle<()>> = Vec::new();

        let mut events = self
            .supervisor
            .start(&job.id, FetchCommand::new(scratch, output_dir));

        while let Some(event) = events.recv().await {
            match event {
                SupervisorEvent::ModuleStarted { name } => {
                    debug!(job = %job.id, module = %name, "Module started");
                    tracker.module_started(&name);
                }
                SupervisorEvent::LessonStarted { name } => {
                    let step = tracker.lesson_started(&name);
                    if step.repeated {
                        debug!(job = %job.id, lesson = %name, "Lesson marker repeated");
                    } else {
                        metrics::LESSONS_STARTED.inc();
                        info!(
                            job = %job.id,
                            lesson = %name,
                            started = step.started,
                            total = tracker.total(),
                            "Lesson started"
                        );
                    }

                    if let (Some(progress), Some((ws, course))) = (step.progress, ledger_key) {
                        if let Err(e) =
                            self.ledger.advance_progress(ws, course, &job.id, progress)
                        {
                            warn!(job = %job.id, "Failed to record progress: {}", e);
                        }
                    }

                    if let Some(active) = self.active.write().await.get_mut(&job.id) {
                        active.lessons_started = step.started;
                        active.current_lesson = Some(name.clone());
                    }

                    match &step.current {
                        Some(current) if uploaded.contains(&current.relative_dir) => {}
                        Some(current) => ctx.mark_lesson(current, LessonStatus::Processing, None),
                        None => warn!(job = %job.id, lesson = %name, "Lesson not found in manifest"),
                    }

                    if let Some(previous) = step.previous {
                        if uploaded.insert(previous.relative_dir.clone()) {
                            let ctx = Arc::clone(&ctx);
                            pending.push(tokio::spawn(async move {
                                // Incremental failures are logged and recorded per lesson.
                                let _ = ctx.upload_lesson(&previous, "incremental").await;
                            }));
                        }
                    }
                }
                SupervisorEvent::Exited { code: Some(0) } => {
                    metrics::FETCH_EXITS.with_label_values(&["success"]).inc();
                    info!(job = %job.id, "Fetch process finished");

                    tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
                    join_all(pending).await;

                    if let Some(last) = tracker.current().cloned() {
                        if uploaded.insert(last.relative_dir.clone()) {
                            ctx.upload_lesson(&last, "final").await?;
                        }
                    }

                    return Ok(FetchResult {
                        lessons_started: tracker.started(),
                        lesson_dirs_uploaded: ctx.dirs_uploaded.load(Ordering::Relaxed),
                    });
                }
                SupervisorEvent::Exited { code: Some(code) } => {
                    metrics::FETCH_EXITS.with_label_values(&["non_zero"]).inc();
                    return Err(WorkerError::ProcessExit { code });
                }
                SupervisorEvent::Exited { code: None } => {
                    metrics::FETCH_EXITS.with_label_values(&["signal"]).inc();
                    return Err(WorkerError::ProcessKilled);
                }
                SupervisorEvent::SpawnFailed { reason } => {
                    metrics::FETCH_EXITS.with_label_values(&["spawn_failed"]).inc();
                    return Err(WorkerError::ProcessSpawn(reason));
                }
                SupervisorEvent::TimedOut { timeout_secs } => {
                    metrics::FETCH_EXITS.with_label_values(&["timeout"]).inc();
                    return Err(WorkerError::ProcessTimeout { timeout_secs });
                }
            }
        }

        Err(WorkerError::ProcessKilled)
    }

    fn record_failure(&self, job_id: &str, ws: &str, course: &str, error: &WorkerError) {
        match self
            .ledger
            .finish_migration(ws, course, job_id, &MigrationOutcome::failed(error.to_string()))
        {
            Ok(_) => {}
            Err(e) => warn!(job = %job_id, "Failed to mark migration as error: {}", e),
        }
    }
}

impl UploadContext {
    async fn upload_lesson(
        &self,
        lesson: &LessonLocation,
        kind: &str,
    ) -> Result<UploadSummary, UploadError> {
        let local = join_relative(&self.output_dir, &lesson.relative_dir);
        let remote = format!("{}/{}", self.prefix, lesson.relative_dir);
        let started = Instant::now();

        let result = self.uploads.upload_dir(&local, &remote).await;
        metrics::DIRECTORY_UPLOAD_DURATION
            .with_label_values(&[kind])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(summary) => {
                self.dirs_uploaded.fetch_add(1, Ordering::Relaxed);
                debug!(
                    job = %self.job_id,
                    lesson = %lesson.relative_dir,
                    files = summary.files_uploaded,
                    skipped = summary.skipped,
                    "Lesson uploaded"
                );
                let stream_url = match (&lesson.video_name, summary.skipped) {
                    (_, true) => None,
                    (Some(video), false) => {
                        Some(self.uploads.public_url(&format!("{}/{}", remote, video)))
                    }
                    (None, false) => Some(self.uploads.public_url(&remote)),
                };
                self.mark_lesson(lesson, LessonStatus::Completed, stream_url.as_deref());
            }
            Err(e) => {
                warn!(
                    job = %self.job_id,
                    lesson = %lesson.relative_dir,
                    kind,
                    "Lesson upload failed: {}",
                    e
                );
                self.mark_lesson(lesson, LessonStatus::Error, None);
            }
        }

        result
    }

    fn mark_lesson(&self, lesson: &LessonLocation, status: LessonStatus, stream_url: Option<&str>) {
        let (Some((ws, course)), Some(lesson_id)) = (&self.ledger_key, &lesson.lesson_id) else {
            return;
        };
        if let Err(e) = self
            .ledger
            .upsert_lesson_status(ws, course, lesson_id, status, stream_url)
        {
            warn!(job = %self.job_id, lesson = %lesson_id, "Failed to record lesson status: {}", e);
        }
    }
}

fn parse_payload(job: &Job) -> Result<JobPayload, WorkerError> {
    let payload: JobPayload = job
        .payload_as()
        .map_err(|e| WorkerError::Validation(format!("malformed payload: {}", e)))?;

    if payload.course_name().trim().is_empty() {
        return Err(WorkerError::Validation("course.name is missing".to_string()));
    }
    if let Some(ws) = &payload.workspace_id {
        validate_identifier("workspaceId", ws).map_err(WorkerError::Validation)?;
    }
    if let Some(course) = &payload.course_id {
        validate_identifier("courseId", course).map_err(WorkerError::Validation)?;
    }
    Ok(payload)
}

/// Identifiers of a payload that failed to parse, when both are present.
fn raw_ledger_key(payload: &str) -> Option<(String, String)> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let ws = value.get("workspaceId")?.as_str()?;
    let course = value.get("courseId")?.as_str()?;
    (!ws.is_empty() && !course.is_empty()).then(|| (ws.to_string(), course.to_string()))
}
