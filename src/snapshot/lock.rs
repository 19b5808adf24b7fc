//! Single-writer lock on the data directory
//!
//! Advisory locking via fd-lock on `.harvest.lock`, so two harvester
//! processes never interleave their writes into one directory.

use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::debug;

use super::{SnapshotError, LOCK_FILE_NAME};

/// Run `f` while holding the exclusive lock of `dir`.
///
/// Blocks until the lock is available; the lock is released when `f`
/// returns.
pub fn with_exclusive<T, F>(dir: &Path, f: F) -> Result<T, SnapshotError>
where
    F: FnOnce() -> Result<T, SnapshotError>,
{
    std::fs::create_dir_all(dir).map_err(|e| SnapshotError::io(dir, e))?;

    let lock_path = dir.join(LOCK_FILE_NAME);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| SnapshotError::Lock {
            path: lock_path.clone(),
            reason: format!("failed to open lock file: {e}"),
        })?;

    let mut lock = RwLock::new(file);
    let _guard = lock.write().map_err(|e| SnapshotError::Lock {
        path: lock_path.clone(),
        reason: format!("failed to acquire lock: {e}"),
    })?;
    debug!(path = %lock_path.display(), "Data directory locked");

    f()
}
