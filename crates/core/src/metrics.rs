//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Worker (jobs, fetch runs, lesson markers)
//! - Upload pipeline (files, bytes, failures)
//! - Control plane (cancellations)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Worker Metrics
// =============================================================================

/// Jobs finished by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("coursebridge_jobs_total", "Total migration jobs processed"),
        &["result"], // "completed", "failed", "skipped"
    )
    .unwrap()
});

/// Duration of a migration job in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "coursebridge_job_duration_seconds",
            "Duration of a migration job",
        )
        .buckets(vec![
            1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
        ]),
        &["result"],
    )
    .unwrap()
});

/// Fetch process exits by kind.
pub static FETCH_EXITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "coursebridge_fetch_exits_total",
            "Fetch process terminations",
        ),
        &["kind"], // "success", "non_zero", "signal", "spawn_failed", "timeout"
    )
    .unwrap()
});

/// Lesson start markers observed.
pub static LESSONS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "coursebridge_lessons_started_total",
        "Lesson start markers seen on fetch output",
    )
    .unwrap()
});

// =============================================================================
// Upload Metrics
// =============================================================================

/// Files uploaded by result.
pub static FILES_UPLOADED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("coursebridge_files_uploaded_total", "Object uploads"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Bytes uploaded.
pub static BYTES_UPLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "coursebridge_bytes_uploaded_total",
        "Bytes written to object storage",
    )
    .unwrap()
});

/// Directory upload duration.
pub static DIRECTORY_UPLOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "coursebridge_directory_upload_duration_seconds",
            "Duration of a lesson or course directory upload",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
        &["kind"], // "incremental", "final"
    )
    .unwrap()
});

// =============================================================================
// Control Plane Metrics
// =============================================================================

/// Cancellations by scope.
pub static CANCELLATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "coursebridge_cancellations_total",
            "Cancellation requests handled",
        ),
        &["scope"], // "all", "one"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Worker
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(FETCH_EXITS.clone()),
        Box::new(LESSONS_STARTED.clone()),
        // Uploads
        Box::new(FILES_UPLOADED.clone()),
        Box::new(BYTES_UPLOADED.clone()),
        Box::new(DIRECTORY_UPLOAD_DURATION.clone()),
        // Control
        Box::new(CANCELLATIONS.clone()),
    ]
}
