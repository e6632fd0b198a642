//! Filesystem helpers shared across modules.
//!
//! These helpers attach operation + path context to IO errors and keep the
//! parent-directory and atomic-replace dance in one place.

use std::path::Path;

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::persistence(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    ensure_dir_all_with_op("creating directory", parent).await
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::persistence(op, path, e))
}

/// Write `contents` next to `path` and rename it into place.
///
/// Readers never observe a half-written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(path).await?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| Error::persistence("writing", &tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::persistence("replacing", path, e))
}

/// Size of a file in bytes, or `None` when it does not exist yet.
pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}
