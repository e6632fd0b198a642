//! Logging setup: console plus daily rolling files, with retention cleanup.
//!
//! This module provides:
//! - An `EnvFilter` from `RUST_LOG`, an explicit directive, or the default
//! - Local timezone timestamps for both outputs
//! - Log file retention cleanup (deletes logs older than 7 days)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "live_capture=info,process_utils=info";

/// Prefix of the rolling log files (`live-capture.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "live-capture.log";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Active logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    filter: String,
    log_dir: PathBuf,
}

impl LoggingConfig {
    /// The filter directive in effect.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Start the log retention cleanup task.
    ///
    /// Runs once at startup and then daily until `cancel_token` fires.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);
            let mut interval = tokio::time::interval(cleanup_interval);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                            warn!(error = %e, "Failed to cleanup old logs");
                        }
                    }
                }
            }
        });
    }
}

/// Delete rolling log files dated more than `retention_days` ago.
///
/// Returns the number of files removed.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| name.strip_prefix(LOG_FILE_PREFIX))
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            continue;
        };

        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Pick the filter: `RUST_LOG` wins, then `directive`, then the default.
fn build_filter(directive: Option<&str>) -> crate::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::config(format!("Invalid log filter directive: {}", e))),
        None => Ok(EnvFilter::new(DEFAULT_LOG_FILTER)),
    }
}

/// Initialize console and rolling file logging.
///
/// # Returns
/// Tuple of (LoggingConfig, WorkerGuard) - keep the guard alive for the app lifetime
pub fn init_logging(
    log_dir: &Path,
    directive: Option<&str>,
) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = build_filter(directive)?;
    let filter_string = filter.to_string();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    let config = Arc::new(LoggingConfig {
        filter: filter_string,
        log_dir: log_dir.to_path_buf(),
    });

    Ok((config, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("live_capture=info"));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_rolling_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = format!("{LOG_FILE_PREFIX}.2001-01-01");
        let today = format!("{LOG_FILE_PREFIX}.{}", Utc::now().format("%Y-%m-%d"));
        for name in [old.as_str(), today.as_str(), "notes.txt", "live-capture.log.garbage"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let deleted = cleanup_old_logs(dir.path(), LOG_RETENTION_DAYS).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(!dir.path().join(&old).exists());
        assert!(dir.path().join(&today).exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("live-capture.log.garbage").exists());
    }

    #[tokio::test]
    async fn test_cleanup_missing_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            cleanup_old_logs(&dir.path().join("absent"), LOG_RETENTION_DAYS)
                .await
                .is_err()
        );
    }
}
