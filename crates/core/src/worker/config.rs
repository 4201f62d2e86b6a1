//! Worker configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the migration worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Enable/disable the worker.
    /// When disabled, jobs accumulate in the queue until a worker runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of worker loops, each processing one job at a time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How often an idle loop polls the queue (milliseconds).
    /// Loops are also woken when a job is enqueued.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause between a successful exit and the closing upload (milliseconds).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_settle_delay() -> u64 {
    2000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }
}
