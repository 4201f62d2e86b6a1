//! Scripted fetch process for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::manifest::{join_relative, CourseManifest};
use crate::supervisor::{
    FetchCommand, ProcessLauncher, ProcessOutput, RunningProcess, SupervisorError,
};

#[derive(Debug, Clone)]
enum Step {
    Stdout(String),
    Stderr(String),
    Sleep(Duration),
    /// Written relative to the command's output directory.
    WriteFile(String, Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
enum Ending {
    Exit(Option<i32>),
    /// Runs until killed.
    Hang,
    /// Output ends without an exit notification.
    Close,
}

/// A launch observed by the scripted launcher.
#[derive(Debug, Clone)]
pub struct RecordedLaunch {
    pub command: FetchCommand,
    /// Scratch manifest contents at launch time, if readable.
    pub manifest: Option<String>,
}

/// Fake fetch executable that replays a fixed script on every launch.
///
/// # Example
///
/// ```rust,ignore
/// use coursebridge_core::testing::ScriptedLauncher;
///
/// let launcher = ScriptedLauncher::new()
///     .stdout("Module 'Intro'")
///     .stdout("Starting download of 'Hello'")
///     .write_file("0_Intro/0_Hello/video.mp4", b"data")
///     .exit(0);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    steps: Vec<Step>,
    ending: Ending,
    spawn_error: Option<String>,
    launches: Arc<RwLock<Vec<RecordedLaunch>>>,
    kills: Arc<AtomicUsize>,
}

impl Default for ScriptedLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLauncher {
    /// An empty script that exits with code 0.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            ending: Ending::Exit(Some(0)),
            spawn_error: None,
            launches: Arc::new(RwLock::new(Vec::new())),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A script that announces every module and lesson of `manifest` in
    /// order, writes one video file per lesson directory and exits with 0.
    pub fn for_manifest(manifest: &CourseManifest) -> Self {
        let mut launcher = Self::new();
        let locations = manifest.lesson_locations();
        for (module_index, module) in manifest.course.modules.iter().enumerate() {
            launcher = launcher.stdout(format!("Module '{}'", module.name));
            for location in locations.iter().filter(|l| l.module_index == module_index) {
                launcher = launcher
                    .stdout(format!("Starting download of '{}'", location.title))
                    .write_file(format!("{}/video.mp4", location.relative_dir), b"video");
            }
        }
        launcher
    }

    pub fn stdout(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Stdout(line.into()));
        self
    }

    pub fn stderr(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Stderr(line.into()));
        self
    }

    pub fn sleep_ms(mut self, ms: u64) -> Self {
        self.steps.push(Step::Sleep(Duration::from_millis(ms)));
        self
    }

    pub fn write_file(mut self, relative: impl Into<String>, contents: &[u8]) -> Self {
        self.steps
            .push(Step::WriteFile(relative.into(), contents.to_vec()));
        self
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.ending = Ending::Exit(Some(code));
        self
    }

    /// Terminate as if killed by a signal.
    pub fn signal(mut self) -> Self {
        self.ending = Ending::Exit(None);
        self
    }

    pub fn hang(mut self) -> Self {
        self.ending = Ending::Hang;
        self
    }

    pub fn close_without_exit(mut self) -> Self {
        self.ending = Ending::Close;
        self
    }

    /// Every launch fails with a spawn error.
    pub fn fail_spawn(mut self, reason: impl Into<String>) -> Self {
        self.spawn_error = Some(reason.into());
        self
    }

    pub async fn recorded_launches(&self) -> Vec<RecordedLaunch> {
        self.launches.read().await.clone()
    }

    pub async fn launch_count(&self) -> usize {
        self.launches.read().await.len()
    }

    /// Shared counter of kills observed by running scripts.
    pub fn kill_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.kills)
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn launch(&self, command: &FetchCommand) -> Result<RunningProcess, SupervisorError> {
        let manifest = tokio::fs::read_to_string(&command.manifest_path).await.ok();
        self.launches.write().await.push(RecordedLaunch {
            command: command.clone(),
            manifest,
        });

        if let Some(reason) = &self.spawn_error {
            return Err(SupervisorError::Spawn(reason.clone()));
        }

        let (tx, rx) = mpsc::channel(64);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let steps = self.steps.clone();
        let ending = self.ending;
        let output_dir = command.output_dir.clone();
        let kills = Arc::clone(&self.kills);

        tokio::spawn(async move {
            for step in steps {
                match step {
                    Step::Stdout(line) => {
                        if tx.send(ProcessOutput::Stdout(line)).await.is_err() {
                            return;
                        }
                    }
                    Step::Stderr(line) => {
                        if tx.send(ProcessOutput::Stderr(line)).await.is_err() {
                            return;
                        }
                    }
                    Step::Sleep(duration) => {
                        tokio::select! {
                            _ = tokio::time::sleep(duration) => {}
                            _ = &mut kill_rx => {
                                kills.fetch_add(1, Ordering::SeqCst);
                                let _ = tx.send(ProcessOutput::Exited(None)).await;
                                return;
                            }
                        }
                    }
                    Step::WriteFile(relative, contents) => {
                        let path = join_relative(&output_dir, &relative);
                        if let Some(parent) = path.parent() {
                            let _ = tokio::fs::create_dir_all(parent).await;
                        }
                        let _ = tokio::fs::write(&path, contents).await;
                    }
                }
            }

            match ending {
                Ending::Exit(code) => {
                    let _ = tx.send(ProcessOutput::Exited(code)).await;
                }
                Ending::Hang => {
                    let _ = kill_rx.await;
                    kills.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(ProcessOutput::Exited(None)).await;
                }
                Ending::Close => {}
            }
        });

        Ok(RunningProcess::new(rx, kill_tx))
    }
}
