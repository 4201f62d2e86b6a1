//! Turns raw process output into supervisor events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{FetchCommand, Marker, MarkerParser, ProcessLauncher, ProcessOutput};

const EVENT_BUFFER: usize = 64;

/// What the worker learns about a running fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    ModuleStarted { name: String },
    LessonStarted { name: String },
    /// Process ended. `code` is `None` when killed by a signal.
    Exited { code: Option<i32> },
    SpawnFailed { reason: String },
    TimedOut { timeout_secs: u64 },
}

impl SupervisorEvent {
    /// Whether no further events follow.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SupervisorEvent::Exited { .. }
                | SupervisorEvent::SpawnFailed { .. }
                | SupervisorEvent::TimedOut { .. }
        )
    }
}

/// Launches fetch runs and reports their markers.
#[derive(Clone)]
pub struct ProcessSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    parser: Arc<MarkerParser>,
    timeout_secs: u64,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, parser: MarkerParser) -> Self {
        Self {
            launcher,
            parser: Arc::new(parser),
            timeout_secs: 0,
        }
    }

    /// Kill runs that take longer than `secs`. 0 disables the limit.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn launcher_name(&self) -> &str {
        self.launcher.name()
    }

    /// Start a run. Events arrive in output order and end with exactly one
    /// final event (see [`SupervisorEvent::is_final`]).
    ///
    /// Dropping the receiver kills the process.
    pub fn start(&self, label: &str, command: FetchCommand) -> mpsc::Receiver<SupervisorEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let launcher = Arc::clone(&self.launcher);
        let parser = Arc::clone(&self.parser);
        let timeout_secs = self.timeout_secs;
        let label = label.to_string();

        tokio::spawn(async move {
            let mut process = match launcher.launch(&command).await {
                Ok(process) => process,
                Err(e) => {
                    warn!(job = %label, error = %e, "Failed to start fetch process");
                    let _ = tx
                        .send(SupervisorEvent::SpawnFailed {
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            info!(
                job = %label,
                manifest = %command.manifest_path.display(),
                output = %command.output_dir.display(),
                "Fetch process started"
            );

            let deadline = (timeout_secs > 0)
                .then(|| Instant::now() + Duration::from_secs(timeout_secs));

            loop {
                let next = match deadline {
                    Some(deadline) => match timeout_at(deadline, process.next_output()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(job = %label, timeout_secs, "Fetch process timed out, killing");
                            process.kill();
                            let _ = tx.send(SupervisorEvent::TimedOut { timeout_secs }).await;
                            return;
                        }
                    },
                    None => process.next_output().await,
                };

                let event = match next {
                    Some(ProcessOutput::Stdout(line)) => match parser.parse(&line) {
                        Some(Marker::Module(name)) => SupervisorEvent::ModuleStarted { name },
                        Some(Marker::Lesson(name)) => SupervisorEvent::LessonStarted { name },
                        None => {
                            debug!(job = %label, "{}", line);
                            continue;
                        }
                    },
                    Some(ProcessOutput::Stderr(line)) => {
                        debug!(job = %label, stream = "stderr", "{}", line);
                        continue;
                    }
                    Some(ProcessOutput::Exited(code)) => SupervisorEvent::Exited { code },
                    None => SupervisorEvent::Exited { code: None },
                };

                let is_final = event.is_final();
                if tx.send(event).await.is_err() {
                    debug!(job = %label, "Event receiver dropped, killing fetch process");
                    process.kill();
                    return;
                }
                if is_final {
                    return;
                }
            }
        });

        rx
    }
}
