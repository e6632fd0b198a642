//! Capture session: one supervised recording lineage for a single source.
//!
//! A [`Session`] runs as its own tokio task. That task is the only writer of the
//! session's status, duration and size; everything it learns is published as
//! [`StatusEvent`]s. The outside world can only ask it to stop, through the
//! session's cancellation token.

pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{StatusEvent, StatusPublisher};
use crate::capture::{CaptureProcess, ProcessRunner, build_capture_command};
use crate::config::SessionOptions;
use crate::utils::fs::file_size;
use crate::{Error, Result};

pub use state::{AttemptDecision, SessionStatus, decide_after_attempt};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

fn default_display_name() -> String {
    "Unknown".to_string()
}

/// The persisted identity of a session.
///
/// Field names are the on-disk schema; the aliases read files written by
/// earlier versions of the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionEntry {
    #[serde(alias = "filename")]
    pub id: String,
    #[serde(rename = "sourceURL", alias = "stream_url")]
    pub source_url: String,
    #[serde(rename = "mediaURL", alias = "hd_stream")]
    pub media_url: String,
    #[serde(rename = "outputFilePath", alias = "output_file")]
    pub output_path: PathBuf,
    #[serde(
        rename = "displayName",
        alias = "username",
        default = "default_display_name"
    )]
    pub display_name: String,
}

/// Final state of a session task.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub id: String,
    pub status: SessionStatus,
    pub retry_count: u32,
    pub elapsed_secs: u64,
    pub size_bytes: u64,
    pub last_error: Option<String>,
}

impl SessionOutcome {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }
}

/// A capture session and its retry loop.
pub struct Session {
    entry: SessionEntry,
    options: SessionOptions,
    status: SessionStatus,
    /// Seconds recorded by finished attempts.
    recorded_secs: u64,
    elapsed_secs: u64,
    size_bytes: u64,
    retry_count: u32,
    last_error: Option<String>,
    runner: Arc<dyn ProcessRunner>,
    publisher: StatusPublisher,
    cancellation_token: CancellationToken,
}

impl Session {
    pub fn new(
        entry: SessionEntry,
        options: SessionOptions,
        runner: Arc<dyn ProcessRunner>,
        publisher: StatusPublisher,
    ) -> Self {
        Self {
            entry,
            options,
            status: SessionStatus::Pending,
            recorded_secs: 0,
            elapsed_secs: 0,
            size_bytes: 0,
            retry_count: 0,
            last_error: None,
            runner,
            publisher,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn entry(&self) -> &SessionEntry {
        &self.entry
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Token that stops this session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Drive the session until it reaches a terminal status.
    pub async fn run(mut self) -> SessionOutcome {
        info!(
            session_id = %self.entry.id,
            name = %self.entry.display_name,
            output = %self.entry.output_path.display(),
            "Session starting"
        );
        self.publish_status(None);

        loop {
            if self.cancellation_token.is_cancelled() {
                self.enter(SessionStatus::Stopped, None);
                break;
            }

            let attempt = self.record_attempt().await;
            let stop_requested = self.cancellation_token.is_cancelled();
            let succeeded = matches!(attempt, Ok(Some(0)));

            if !stop_requested && !succeeded {
                let err = match attempt {
                    Err(e) => e,
                    Ok(code) => Error::ProcessExitedNonZero { code },
                };
                error!(
                    session_id = %self.entry.id,
                    kind = err.kind(),
                    error = %err,
                    attempt = self.retry_count + 1,
                    "Capture attempt failed"
                );
                self.last_error = Some(err.to_string());
            }

            match decide_after_attempt(
                stop_requested,
                succeeded,
                self.retry_count,
                self.options.max_retries,
            ) {
                AttemptDecision::Stop => {
                    self.enter(SessionStatus::Stopped, None);
                    break;
                }
                AttemptDecision::Complete => {
                    self.enter(SessionStatus::Completed, None);
                    break;
                }
                AttemptDecision::Reconnect { retry_count } => {
                    self.retry_count = retry_count;
                    let message = format!("retry {}/{}", retry_count, self.options.max_retries);
                    self.enter(SessionStatus::Reconnecting, Some(message));
                    if !self.backoff().await {
                        self.enter(SessionStatus::Stopped, None);
                        break;
                    }
                }
                AttemptDecision::Fail { retry_count } => {
                    self.retry_count = retry_count;
                    let last_error = self
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "capture failed".to_string());
                    let exhausted = Error::RetriesExhausted {
                        attempts: retry_count,
                        last_error: last_error.clone(),
                    };
                    error!(session_id = %self.entry.id, kind = exhausted.kind(), "{}", exhausted);
                    self.enter(SessionStatus::Failed, Some(last_error));
                    break;
                }
            }
        }

        info!(
            session_id = %self.entry.id,
            status = %self.status,
            retries = self.retry_count,
            elapsed_secs = self.elapsed_secs,
            "Session finished"
        );

        SessionOutcome {
            id: self.entry.id.clone(),
            status: self.status,
            retry_count: self.retry_count,
            elapsed_secs: self.elapsed_secs,
            size_bytes: self.size_bytes,
            last_error: self.last_error.clone(),
        }
    }

    /// Launch one capture process and supervise it until it exits.
    ///
    /// The process is always force-terminated afterwards, whatever the outcome.
    async fn record_attempt(&mut self) -> Result<Option<i32>> {
        let command = build_capture_command(
            &self.options.ffmpeg_path,
            &self.entry.media_url,
            &self.entry.output_path,
            self.options.max_duration_secs,
        );

        let mut process = self.runner.start(&command)?;
        debug!(session_id = %self.entry.id, pid = process.id(), "Capture process launched");
        self.enter(SessionStatus::Recording, None);

        let result = self.supervise(process.as_mut()).await;
        process.force_terminate().await;
        result
    }

    /// Poll the running process while ticking the duration clock.
    async fn supervise(&mut self, process: &mut dyn CaptureProcess) -> Result<Option<i32>> {
        let started = Instant::now();
        let mut poll = interval_at(started + self.options.poll_interval, self.options.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick = interval_at(started + self.options.tick_interval, self.options.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancellation_token = self.cancellation_token.clone();

        let result = loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => {
                    break self.stop_process(process).await;
                }

                _ = poll.tick() => {
                    if !process.is_alive() {
                        break process.wait().await;
                    }
                    self.report_size();
                }

                _ = tick.tick() => {
                    self.report_duration(started);
                }
            }
        };

        self.report_duration(started);
        self.recorded_secs = self.elapsed_secs;
        result
    }

    /// Interrupt the process and give it `stop_timeout` to finalize its output.
    async fn stop_process(&mut self, process: &mut dyn CaptureProcess) -> Result<Option<i32>> {
        info!(session_id = %self.entry.id, "Stop requested, interrupting capture process");
        if let Err(e) = process.request_graceful_stop() {
            warn!(session_id = %self.entry.id, error = %e, "Failed to interrupt capture process");
        }

        match tokio::time::timeout(self.options.stop_timeout, process.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    session_id = %self.entry.id,
                    "Capture process did not exit in time; killing"
                );
                process.force_terminate().await;
                Ok(None)
            }
        }
    }

    /// Wait out the retry backoff. Returns `false` when stopped meanwhile.
    async fn backoff(&self) -> bool {
        debug!(
            session_id = %self.entry.id,
            delay_ms = self.options.retry_backoff.as_millis() as u64,
            "Waiting before reconnecting"
        );
        tokio::select! {
            _ = self.cancellation_token.cancelled() => false,
            _ = tokio::time::sleep(self.options.retry_backoff) => true,
        }
    }

    fn report_size(&mut self) {
        let Some(bytes) = file_size(&self.entry.output_path) else {
            return;
        };
        // A relaunch rewrites the file from scratch; keep the reported size monotonic.
        self.size_bytes = self.size_bytes.max(bytes);
        self.publisher.publish(StatusEvent::size_tick(
            self.entry.id.as_str(),
            self.size_bytes as f64 / BYTES_PER_MB,
        ));
    }

    fn report_duration(&mut self, started: Instant) {
        let elapsed = self.recorded_secs + started.elapsed().as_secs();
        if elapsed > self.elapsed_secs {
            self.elapsed_secs = elapsed;
            self.publisher
                .publish(StatusEvent::duration_tick(self.entry.id.as_str(), elapsed));
        }
    }

    fn enter(&mut self, next: SessionStatus, message: Option<String>) {
        if let Err(e) = self.transition(next) {
            error!(session_id = %self.entry.id, error = %e, "Rejected status change");
            return;
        }
        self.publish_status(message);
    }

    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        debug!(session_id = %self.entry.id, from = %self.status, to = %next, "Status change");
        self.status = next;
        Ok(())
    }

    fn publish_status(&self, message: Option<String>) {
        self.publisher.publish(StatusEvent::status_changed(
            self.entry.id.as_str(),
            self.status,
            message,
        ));
    }
}
