//! Presentation seam: where dispatched events end up.

use serde::Serialize;
use tracing::{info, trace, warn};

use crate::bus::{StatusEvent, StatusEventKind};
use crate::session::SessionStatus;
use crate::telemetry::format_duration;

/// What the consumer knows about one session, built only from its events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub display_name: String,
    pub status: SessionStatus,
    pub seconds: u64,
    pub megabytes: f64,
    pub retries: u32,
    pub message: Option<String>,
}

impl SessionView {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            status: SessionStatus::Pending,
            seconds: 0,
            megabytes: 0.0,
            retries: 0,
            message: None,
        }
    }

    /// Fold one event into the view.
    pub fn apply(&mut self, kind: &StatusEventKind) {
        match kind {
            StatusEventKind::StatusChanged { status, message } => {
                if *status == SessionStatus::Reconnecting {
                    self.retries += 1;
                }
                self.status = *status;
                self.message = message.clone();
            }
            StatusEventKind::DurationTick { seconds } => {
                self.seconds = self.seconds.max(*seconds);
            }
            StatusEventKind::SizeTick { megabytes } => {
                self.megabytes = self.megabytes.max(*megabytes);
            }
        }
    }
}

/// Receives every dispatched event on the consumer context, after the view
/// has been updated.
pub trait StatusSink: Send {
    fn on_event(&mut self, event: &StatusEvent, view: &SessionView);
}

/// Logs status changes; ticks only at trace level.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn on_event(&mut self, event: &StatusEvent, view: &SessionView) {
        match &event.kind {
            StatusEventKind::StatusChanged {
                status: SessionStatus::Failed,
                message,
            } => warn!(
                session_id = %event.session_id,
                name = %view.display_name,
                retries = view.retries,
                error = message.as_deref().unwrap_or("unknown"),
                "Recording failed"
            ),
            StatusEventKind::StatusChanged { status, message } => info!(
                session_id = %event.session_id,
                name = %view.display_name,
                status = %status,
                detail = message.as_deref(),
                duration = %format_duration(view.seconds),
                size_mb = format_args!("{:.2}", view.megabytes),
                "Status changed"
            ),
            StatusEventKind::DurationTick { .. } | StatusEventKind::SizeTick { .. } => trace!(
                session_id = %event.session_id,
                duration = %format_duration(view.seconds),
                size_mb = view.megabytes,
                "Progress"
            ),
        }
    }
}
