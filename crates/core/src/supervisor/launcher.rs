//! Launcher backed by `tokio::process`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{FetchCommand, ProcessLauncher, ProcessOutput, RunningProcess, SupervisorError};

const OUTPUT_BUFFER: usize = 256;

/// Runs the configured executable as a child process.
pub struct TokioProcessLauncher {
    executable: PathBuf,
}

impl TokioProcessLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    fn name(&self) -> &str {
        "tokio"
    }

    async fn launch(&self, command: &FetchCommand) -> Result<RunningProcess, SupervisorError> {
        let mut child = Command::new(&self.executable)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SupervisorError::ExecutableNotFound {
                        path: self.executable.clone(),
                    }
                } else {
                    SupervisorError::Spawn(e.to_string())
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::Spawn("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SupervisorError::Spawn("stderr was not captured".to_string()))?;

        debug!(pid = ?child.id(), executable = %self.executable.display(), "Process spawned");

        let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let stdout_task = tokio::spawn(forward_lines(stdout, tx.clone(), ProcessOutput::Stdout));
            let stderr_task = tokio::spawn(forward_lines(stderr, tx.clone(), ProcessOutput::Stderr));

            let code = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(error = %e, "Failed to wait for process");
                        None
                    }
                },
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill process");
                    }
                    child.wait().await.ok().and_then(|status| status.code())
                }
            };

            // Drain both streams before reporting the exit.
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let _ = tx.send(ProcessOutput::Exited(code)).await;
        });

        Ok(RunningProcess::new(rx, kill_tx))
    }
}

async fn forward_lines<R>(
    reader: R,
    tx: mpsc::Sender<ProcessOutput>,
    wrap: fn(String) -> ProcessOutput,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarding = true;

    // Read to EOF even when nobody listens, so the child never writes to a
    // closed pipe.
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read process output");
                break;
            }
        }
        if !forwarding {
            continue;
        }

        let line = decode_line(&buf);
        if tx.send(wrap(line)).await.is_err() {
            forwarding = false;
        }
    }
}

/// Strip the line ending; invalid UTF-8 is replaced, not fatal.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    match std::str::from_utf8(raw) {
        Ok(line) => line.to_string(),
        Err(_) => {
            debug!("Process output line is not valid UTF-8");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}
