//! Supervision of the external fetch executable.
//!
//! The executable is launched with the scratch manifest and the output
//! directory. Its stdout is scanned for marker lines which are translated
//! into [`SupervisorEvent`]s; everything else is only logged.

mod launcher;
mod markers;
mod runner;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use launcher::TokioProcessLauncher;
pub use markers::{Marker, MarkerParser, DEFAULT_LESSON_PATTERN, DEFAULT_MODULE_PATTERN};
pub use runner::{ProcessSupervisor, SupervisorEvent};

/// Errors that can occur while launching or supervising a process.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Executable could not be found.
    #[error("Executable not found: {path}")]
    ExecutableNotFound { path: PathBuf },

    /// Spawn failed for another reason.
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    /// A marker pattern failed to compile.
    #[error("Invalid marker pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Arguments for one fetch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCommand {
    pub manifest_path: PathBuf,
    pub output_dir: PathBuf,
}

impl FetchCommand {
    pub fn new(manifest_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            output_dir: output_dir.into(),
        }
    }

    /// `--jsonPath=<manifest>` and `--output=<dir>`.
    pub fn args(&self) -> Vec<String> {
        vec![
            format!("--jsonPath={}", display(&self.manifest_path)),
            format!("--output={}", display(&self.output_dir)),
        ]
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// One item read from a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    Stdout(String),
    Stderr(String),
    /// Always the last item. `None` when terminated by a signal.
    Exited(Option<i32>),
}

/// Handle to a launched process.
pub struct RunningProcess {
    output: mpsc::Receiver<ProcessOutput>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl RunningProcess {
    pub fn new(output: mpsc::Receiver<ProcessOutput>, kill_tx: oneshot::Sender<()>) -> Self {
        Self {
            output,
            kill_tx: Some(kill_tx),
        }
    }

    /// Next output item, `None` once the process is fully gone.
    pub async fn next_output(&mut self) -> Option<ProcessOutput> {
        self.output.recv().await
    }

    /// Ask the launcher to kill the process. Idempotent.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Starts fetch processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launcher name for logging.
    fn name(&self) -> &str;

    async fn launch(&self, command: &FetchCommand) -> Result<RunningProcess, SupervisorError>;
}
