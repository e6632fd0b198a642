//! Persisted list of active sessions.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;
use crate::session::SessionEntry;
use crate::utils::json::{self, JsonContext};

/// JSON file holding the entries of every active session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored entries; empty when the file is missing or corrupt.
    pub async fn load(&self) -> Vec<SessionEntry> {
        let entries: Vec<SessionEntry> =
            json::load_or_default(&self.path, JsonContext::SessionList).await;
        debug!(path = %self.path.display(), count = entries.len(), "Loaded session list");
        entries
    }

    /// Replace the stored list.
    pub async fn save(&self, entries: &[SessionEntry]) -> Result<()> {
        json::save_pretty(&self.path, entries).await?;
        debug!(path = %self.path.display(), count = entries.len(), "Saved session list");
        Ok(())
    }
}
