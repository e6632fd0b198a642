//! Aggregate statistics over completed recordings.
//!
//! Only the consumer folds into the aggregator, and it persists after every
//! fold. A missing or unreadable store starts from zero.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;
use crate::utils::json::{self, JsonContext};

/// Lifetime totals across completed recordings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySnapshot {
    #[serde(rename = "totalRecordings", alias = "total_recordings")]
    pub total_recordings: u64,
    #[serde(rename = "totalDurationSeconds", alias = "total_duration")]
    pub total_duration_seconds: u64,
    #[serde(rename = "totalSizeMB", alias = "total_size")]
    pub total_size_mb: f64,
}

impl TelemetrySnapshot {
    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Total Recordings: {} | Total Duration: {} | Total Size: {:.1} GB",
            self.total_recordings,
            format_duration(self.total_duration_seconds),
            self.total_size_mb / 1024.0
        )
    }
}

/// Accumulates completed-session statistics backed by a JSON file.
#[derive(Debug)]
pub struct TelemetryAggregator {
    path: PathBuf,
    snapshot: TelemetrySnapshot,
}

impl TelemetryAggregator {
    /// An empty aggregator persisting to `path`; nothing is read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: TelemetrySnapshot::default(),
        }
    }

    /// Restore the aggregate from `path`, or start from zero.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = json::load_or_default(&path, JsonContext::Telemetry).await;
        debug!(path = %path.display(), ?snapshot, "Loaded telemetry");
        Self { path, snapshot }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add one completed recording.
    pub fn fold(&mut self, duration_secs: u64, size_mb: f64) {
        self.snapshot.total_recordings += 1;
        self.snapshot.total_duration_seconds += duration_secs;
        self.snapshot.total_size_mb += size_mb;
        info!(
            duration_secs,
            size_mb,
            total_recordings = self.snapshot.total_recordings,
            "Recording folded into telemetry"
        );
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.clone()
    }

    pub async fn save(&self) -> Result<()> {
        json::save_pretty(&self.path, &self.snapshot).await
    }
}

/// Format seconds as `MM:SS`, or `HH:MM:SS` from one hour up.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_accumulates() {
        let mut aggregator = TelemetryAggregator::new("unused.json");
        for (secs, mb) in [(10, 1.0), (20, 2.0), (5, 0.5)] {
            aggregator.fold(secs, mb);
        }

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.total_recordings, 3);
        assert_eq!(snapshot.total_duration_seconds, 35);
        assert!((snapshot.total_size_mb - 3.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_stats.json");

        let mut aggregator = TelemetryAggregator::load(&path).await;
        aggregator.fold(60, 12.5);
        aggregator.save().await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["totalRecordings"], 1);
        assert_eq!(raw["totalDurationSeconds"], 60);
        assert_eq!(raw["totalSizeMB"], 12.5);

        let restored = TelemetryAggregator::load(&path).await;
        assert_eq!(restored.snapshot(), aggregator.snapshot());
    }

    #[tokio::test]
    async fn test_missing_store_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = TelemetryAggregator::load(dir.path().join("absent.json")).await;
        assert_eq!(aggregator.snapshot(), TelemetrySnapshot::default());
    }

    #[tokio::test]
    async fn test_corrupt_store_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_stats.json");
        std::fs::write(&path, "{ not json").unwrap();

        let aggregator = TelemetryAggregator::load(&path).await;
        assert_eq!(aggregator.snapshot(), TelemetrySnapshot::default());
    }

    #[tokio::test]
    async fn test_legacy_store_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_stats.json");
        std::fs::write(
            &path,
            r#"{"total_recordings": 4, "total_duration": 3700, "total_size": 2048}"#,
        )
        .unwrap();

        let snapshot = TelemetryAggregator::load(&path).await.snapshot();
        assert_eq!(snapshot.total_recordings, 4);
        assert_eq!(snapshot.total_duration_seconds, 3700);
        assert_eq!(snapshot.total_size_mb, 2048.0);
        assert_eq!(
            snapshot.summary(),
            "Total Recordings: 4 | Total Duration: 01:01:40 | Total Size: 2.0 GB"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(59), "00:59");
        assert_eq!(format_duration(61), "01:01");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "01:00:00");
        assert_eq!(format_duration(90061), "25:01:01");
    }
}
