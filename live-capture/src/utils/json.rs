//! JSON store helpers with consistent warning logs.
//!
//! Stores are best effort: a missing file is an empty state, and a file that
//! fails to parse is logged and replaced by defaults rather than aborting.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::Result;
use crate::utils::fs;

/// Which store is being read, for log context.
#[derive(Debug, Clone, Copy)]
pub enum JsonContext {
    SessionList,
    Telemetry,
}

impl JsonContext {
    fn as_str(&self) -> &'static str {
        match self {
            Self::SessionList => "session_list",
            Self::Telemetry => "telemetry",
        }
    }
}

/// Load a JSON document, falling back to `T::default()` when the file is
/// missing, unreadable or corrupt.
pub async fn load_or_default<T: DeserializeOwned + Default>(path: &Path, ctx: JsonContext) -> T {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(store = ctx.as_str(), path = %path.display(), "Store not found, starting empty");
            return T::default();
        }
        Err(error) => {
            warn!(
                store = ctx.as_str(),
                path = %path.display(),
                error = %error,
                "Failed to read store, using defaults"
            );
            return T::default();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(
                store = ctx.as_str(),
                path = %path.display(),
                raw_len = raw.len(),
                error = %error,
                "Failed to parse store, using defaults"
            );
            T::default()
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub async fn save_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write_atomic(path, &bytes).await
}
