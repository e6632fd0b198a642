//! Producer-side entry point: turns start requests into registered sessions.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::StatusPublisher;
use crate::capture::ProcessRunner;
use crate::config::RecorderConfig;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::resolver::SourceResolver;
use crate::session::{Session, SessionEntry};
use crate::utils::fs;
use crate::Result;

/// Starts, restores and stops sessions.
pub struct SessionController {
    config: RecorderConfig,
    resolver: Arc<dyn SourceResolver>,
    runner: Arc<dyn ProcessRunner>,
    registry: Arc<SessionRegistry>,
    publisher: StatusPublisher,
}

impl SessionController {
    pub fn new(
        config: RecorderConfig,
        resolver: Arc<dyn SourceResolver>,
        runner: Arc<dyn ProcessRunner>,
        registry: Arc<SessionRegistry>,
        publisher: StatusPublisher,
    ) -> Self {
        Self {
            config,
            resolver,
            runner,
            registry,
            publisher,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Resolve a source and start recording it.
    ///
    /// Nothing is spawned when resolution or the work directory fails.
    pub async fn start_session(
        &self,
        source_url: &str,
        display_name: Option<&str>,
        max_duration_secs: Option<u64>,
    ) -> Result<SessionEntry> {
        let resolved = self.resolver.resolve(source_url, display_name).await?;
        fs::ensure_dir_all_with_op("creating work directory", &resolved.work_dir).await?;

        let file_name = format!("{}_{}.ts", resolved.display_name, Uuid::new_v4());
        let entry = SessionEntry {
            id: file_name.clone(),
            source_url: source_url.trim().to_string(),
            media_url: resolved.media_url,
            output_path: resolved.work_dir.join(&file_name),
            display_name: resolved.display_name,
        };

        self.launch(entry.clone(), max_duration_secs)?;
        info!(
            session_id = %entry.id,
            name = %entry.display_name,
            media_url = %entry.media_url,
            "Recording started"
        );
        Ok(entry)
    }

    /// Relaunch persisted sessions with their stored id, media URL and output.
    ///
    /// Returns how many were started; entries that cannot be started are
    /// logged and skipped.
    pub async fn restore(&self, entries: Vec<SessionEntry>) -> usize {
        let total = entries.len();
        let mut started = 0;

        for entry in entries {
            let id = entry.id.clone();
            if let Err(e) = fs::ensure_parent_dir(&entry.output_path).await {
                warn!(session_id = %id, kind = e.kind(), error = %e, "Cannot restore session");
                continue;
            }
            match self.launch(entry, None) {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!(session_id = %id, kind = e.kind(), error = %e, "Cannot restore session")
                }
            }
        }

        if total > 0 {
            info!(restored = started, total, "Restored persisted sessions");
        }
        started
    }

    /// Ask one session to stop.
    pub fn stop_session(&self, id: &str) -> Result<()> {
        self.registry.stop(id)?;
        Ok(())
    }

    fn launch(
        &self,
        entry: SessionEntry,
        max_duration_secs: Option<u64>,
    ) -> Result<Arc<SessionHandle>> {
        let session = Session::new(
            entry,
            self.config.session_options(max_duration_secs),
            self.runner.clone(),
            self.publisher.clone(),
        );
        Ok(self.registry.add(session)?)
    }
}
