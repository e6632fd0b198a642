//! Recorder configuration.
//!
//! `RecorderConfig` is the process-wide configuration. Each session gets its
//! own [`SessionOptions`], derived from the recorder configuration plus any
//! per-session overrides (currently only the max duration).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// File name of the persisted session list inside the data directory.
pub const SESSIONS_FILE: &str = "stream_links.json";

/// File name of the persisted telemetry inside the data directory.
pub const STATS_FILE: &str = "recording_stats.json";

/// Process-wide recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Root directory for per-source work directories.
    pub output_root: PathBuf,
    /// Directory holding the session list and telemetry stores.
    pub data_dir: PathBuf,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
    /// Attempts allowed per session before it is marked failed.
    pub max_retries: u32,
    /// Fixed delay between a failed attempt and the next launch.
    pub retry_backoff_ms: u64,
    /// Liveness / file size poll period while recording.
    pub poll_interval_ms: u64,
    /// Duration tick period while recording.
    pub tick_interval_ms: u64,
    /// Consumer drain period.
    pub dispatch_interval_ms: u64,
    /// How long a session waits for its process after the interrupt before killing it.
    pub stop_timeout_ms: u64,
    /// Upper bound on waiting for all sessions during shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            output_root: PathBuf::from("recordings"),
            data_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            max_retries: 3,
            retry_backoff_ms: 5_000,
            poll_interval_ms: 100,
            tick_interval_ms: 1_000,
            dispatch_interval_ms: 100,
            stop_timeout_ms: 10_000,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl RecorderConfig {
    /// Reject configurations that would make the timers spin or never fire.
    pub fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(Error::config("ffmpeg path must not be empty"));
        }
        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("tick_interval_ms", self.tick_interval_ms),
            ("dispatch_interval_ms", self.dispatch_interval_ms),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn sessions_file(&self) -> PathBuf {
        self.data_dir.join(SESSIONS_FILE)
    }

    pub fn stats_file(&self) -> PathBuf {
        self.data_dir.join(STATS_FILE)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Options for a new session, with an optional max duration in seconds.
    pub fn session_options(&self, max_duration_secs: Option<u64>) -> SessionOptions {
        SessionOptions {
            ffmpeg_path: self.ffmpeg_path.clone(),
            max_retries: self.max_retries,
            max_duration_secs: max_duration_secs.filter(|secs| *secs > 0),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

/// Per-session tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub ffmpeg_path: String,
    pub max_retries: u32,
    pub max_duration_secs: Option<u64>,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        RecorderConfig::default().session_options(None)
    }
}
