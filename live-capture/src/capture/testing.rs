//! Scripted in-memory process runner for state machine tests.
//!
//! Processes are driven by the tokio clock, so tests running with
//! `start_paused = true` see backoff delays and runtimes elapse instantly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::process_runner::{CaptureCommand, CaptureProcess, ProcessRunner};
use crate::{Error, Result};

/// Exit code reported by a scripted process after an interrupt, like ffmpeg.
pub(crate) const INTERRUPTED_EXIT_CODE: i32 = 255;

/// What the next launched process does.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    /// Run for `after`, then exit with `code`.
    Exit { after: Duration, code: i32 },
    /// Fail to spawn.
    SpawnFail,
    /// Run until interrupted or killed.
    UntilStopped,
    /// Run until killed; interrupts are ignored.
    IgnoreInterrupt,
}

#[derive(Default)]
struct Counters {
    spawns: AtomicUsize,
    interrupts: AtomicUsize,
    kills: AtomicUsize,
    live: AtomicUsize,
}

/// A runner that plays back a script of [`Step`]s, one per launch.
///
/// Once the script is exhausted every further launch runs until stopped.
#[derive(Clone, Default)]
pub(crate) struct ScriptedRunner {
    steps: Arc<Mutex<VecDeque<Step>>>,
    commands: Arc<Mutex<Vec<CaptureCommand>>>,
    counters: Arc<Counters>,
}

impl ScriptedRunner {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            ..Default::default()
        }
    }

    pub(crate) fn spawns(&self) -> usize {
        self.counters.spawns.load(Ordering::SeqCst)
    }

    pub(crate) fn interrupts(&self) -> usize {
        self.counters.interrupts.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.counters.kills.load(Ordering::SeqCst)
    }

    /// Processes launched and not yet exited.
    pub(crate) fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub(crate) fn commands(&self) -> Vec<CaptureCommand> {
        self.commands.lock().clone()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn start(&self, command: &CaptureCommand) -> Result<Box<dyn CaptureProcess>> {
        let step = self.steps.lock().pop_front().unwrap_or(Step::UntilStopped);
        self.commands.lock().push(command.clone());

        let (ends_at, code, honors_interrupt) = match step {
            Step::SpawnFail => {
                return Err(Error::SpawnFailed {
                    program: command.program.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            Step::Exit { after, code } => (Some(Instant::now() + after), code, true),
            Step::UntilStopped => (None, 0, true),
            Step::IgnoreInterrupt => (None, 0, false),
        };

        let pid = self.counters.spawns.fetch_add(1, Ordering::SeqCst) as u32 + 1000;
        self.counters.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedProcess {
            pid,
            ends_at,
            code,
            honors_interrupt,
            exit: None,
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedProcess {
    pid: u32,
    ends_at: Option<Instant>,
    code: i32,
    honors_interrupt: bool,
    exit: Option<Option<i32>>,
    counters: Arc<Counters>,
}

impl ScriptedProcess {
    fn finish(&mut self, code: Option<i32>) {
        if self.exit.is_none() {
            self.exit = Some(code);
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CaptureProcess for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        self.exit.is_none().then_some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.ends_at {
            Some(at) if Instant::now() >= at => {
                self.finish(Some(self.code));
                false
            }
            _ => true,
        }
    }

    fn request_graceful_stop(&mut self) -> Result<()> {
        self.counters.interrupts.fetch_add(1, Ordering::SeqCst);
        if self.exit.is_none() && self.honors_interrupt {
            self.ends_at = Some(Instant::now());
            self.code = INTERRUPTED_EXIT_CODE;
        }
        Ok(())
    }

    async fn force_terminate(&mut self) {
        if self.exit.is_none() {
            self.counters.kills.fetch_add(1, Ordering::SeqCst);
            self.finish(None);
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        if let Some(code) = self.exit {
            return Ok(code);
        }
        match self.ends_at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
        self.finish(Some(self.code));
        Ok(Some(self.code))
    }
}
