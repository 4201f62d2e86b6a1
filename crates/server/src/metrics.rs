//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the coursebridge server:
//! - HTTP request metrics (latency, counts)
//! - Queue depth and paused flag (collected dynamically)
//! - Worker status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "coursebridge_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("coursebridge_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "coursebridge_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics (collected dynamically)
// =============================================================================

/// Jobs by queue state.
pub static QUEUE_JOBS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("coursebridge_queue_jobs", "Current job count by queue state"),
        &["state"],
    )
    .unwrap()
});

/// Queue paused flag (1 = paused).
pub static QUEUE_PAUSED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("coursebridge_queue_paused", "Whether the queue is paused").unwrap()
});

// =============================================================================
// Worker Metrics (collected dynamically)
// =============================================================================

/// Worker running state (1 = running, 0 = stopped).
pub static WORKER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "coursebridge_worker_running",
        "Whether the migration worker is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Jobs currently being processed.
pub static WORKER_ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "coursebridge_worker_active_jobs",
        "Number of migration jobs currently running",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Queue
    registry.register(Box::new(QUEUE_JOBS.clone())).unwrap();
    registry.register(Box::new(QUEUE_PAUSED.clone())).unwrap();

    // Worker
    registry.register(Box::new(WORKER_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(WORKER_ACTIVE_JOBS.clone()))
        .unwrap();

    // Core metrics (worker, uploads, control plane)
    for metric in coursebridge_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the queue and worker at
/// scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Ok(counts) = state.queue().counts() {
        for (label, value) in [
            ("waiting", counts.waiting),
            ("delayed", counts.delayed),
            ("active", counts.active),
            ("completed", counts.completed),
            ("failed", counts.failed),
        ] {
            QUEUE_JOBS.with_label_values(&[label]).set(value as i64);
        }
        QUEUE_PAUSED.set(if counts.paused { 1 } else { 0 });
    }

    if let Some(worker) = state.worker() {
        let status = worker.status().await;
        WORKER_RUNNING.set(if status.running { 1 } else { 0 });
        WORKER_ACTIVE_JOBS.set(status.active_jobs.len() as i64);
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    // Object keys under /content are unbounded
    if path.starts_with("/content/") {
        return "/content/{key}".to_string();
    }

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
