//! Process management for capture attempts.
//!
//! A [`ProcessRunner`] launches exactly one OS child per call to
//! [`ProcessRunner::start`]; the returned [`CaptureProcess`] is owned by the
//! session that launched it and exposes liveness, the graceful interrupt, the
//! forced termination fallback and the final exit code.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tracing::{debug, warn};

use crate::{Error, Result};

/// A command line for one capture attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// Launches capture processes.
///
/// Spawn failures are returned as [`Error::SpawnFailed`] and never retried
/// here; retry policy belongs to the session.
pub trait ProcessRunner: Send + Sync {
    fn start(&self, command: &CaptureCommand) -> Result<Box<dyn CaptureProcess>>;
}

/// One running capture process.
#[async_trait]
pub trait CaptureProcess: Send {
    /// OS process id while the process has not been reaped.
    fn id(&self) -> Option<u32>;

    /// Non-blocking liveness check.
    fn is_alive(&mut self) -> bool;

    /// Ask the process to finish its output and exit (SIGINT on Unix).
    fn request_graceful_stop(&mut self) -> Result<()>;

    /// Kill the process if it is still running and reap it. Idempotent.
    async fn force_terminate(&mut self);

    /// Wait for exit and return the exit code (`None` when killed by a signal).
    async fn wait(&mut self) -> Result<Option<i32>>;
}

/// Runs capture commands as real OS processes.
#[derive(Debug, Default, Clone)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn start(&self, command: &CaptureCommand) -> Result<Box<dyn CaptureProcess>> {
        let mut child = process_utils::tokio_command(&command.program)
            .args(&command.args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::SpawnFailed {
                program: command.program.clone(),
                source,
            })?;

        let pid = child.id();
        debug!(program = %command.program, pid, "Spawned capture process");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, pid));
        }

        Ok(Box::new(ChildProcess {
            child,
            status: None,
        }))
    }
}

/// Forward the capture tool's diagnostics into the log until it closes stderr.
async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => warn!(pid, "capture process: {}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(pid, error = %e, "Stopped reading capture process stderr");
                break;
            }
        }
    }
}

/// A capture process backed by a tokio child.
struct ChildProcess {
    child: Child,
    status: Option<ExitStatus>,
}

#[async_trait]
impl CaptureProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        if self.status.is_some() {
            return None;
        }
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "Failed to poll capture process");
                false
            }
        }
    }

    fn request_graceful_stop(&mut self) -> Result<()> {
        let Some(pid) = self.id() else {
            return Ok(());
        };

        match process_utils::interrupt(pid) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::Unsupported => {
                debug!(pid, "Interrupt unsupported, killing capture process");
                self.child.start_kill().map_err(Error::Io)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn force_terminate(&mut self) {
        if self.status.is_some() {
            return;
        }
        // Fails only when the process already exited; the wait below reaps it either way.
        let _ = self.child.start_kill();
        match self.child.wait().await {
            Ok(status) => self.status = Some(status),
            Err(e) => warn!(error = %e, "Failed to reap capture process"),
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        if let Some(status) = self.status {
            return Ok(status.code());
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        Ok(status.code())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> CaptureCommand {
        CaptureCommand::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failed() {
        let runner = SystemProcessRunner::new();
        let result = runner.start(&CaptureCommand::new(
            "/nonexistent/definitely-not-ffmpeg",
            vec![],
        ));
        match result {
            Err(Error::SpawnFailed { program, .. }) => {
                assert_eq!(program, "/nonexistent/definitely-not-ffmpeg")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let runner = SystemProcessRunner::new();
        let mut process = runner.start(&sh("exit 3")).unwrap();

        assert_eq!(process.wait().await.unwrap(), Some(3));
        assert!(!process.is_alive());
        assert_eq!(process.id(), None);
    }

    #[tokio::test]
    async fn test_is_alive_while_running() {
        let runner = SystemProcessRunner::new();
        let mut process = runner.start(&sh("sleep 30")).unwrap();

        assert!(process.is_alive());
        assert!(process.id().is_some());

        process.force_terminate().await;
        assert!(!process.is_alive());
        // Second call is a no-op.
        process.force_terminate().await;
    }

    #[tokio::test]
    async fn test_graceful_stop_lets_process_finish() {
        let runner = SystemProcessRunner::new();
        let mut process = runner
            .start(&sh("trap 'exit 0' INT; while true; do sleep 0.05; done"))
            .unwrap();

        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        process.request_graceful_stop().unwrap();

        let code = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("process should exit after SIGINT")
            .unwrap();
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn test_graceful_stop_after_exit_is_noop() {
        let runner = SystemProcessRunner::new();
        let mut process = runner.start(&sh("exit 0")).unwrap();
        process.wait().await.unwrap();

        assert!(process.request_graceful_stop().is_ok());
    }
}
