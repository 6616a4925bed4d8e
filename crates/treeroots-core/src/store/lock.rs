//! Cross-process scan lock: an exclusive advisory lock on a file in the
//! project's data directory.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Instant;

use fs2::FileExt;
use tracing::debug;

use crate::errors::{TreeRootsError, TreeRootsResult};

pub const SCAN_LOCK_FILE: &str = "scan.lock";

/// Held for the duration of a scan; released on drop.
pub struct ScanLock {
    file: File,
}

impl ScanLock {
    /// Block until no other process (or handle) holds the lock at `path`.
    pub fn acquire(path: &Path) -> TreeRootsResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| lock_error(path, "open", e))?;

        let start = Instant::now();
        file.lock_exclusive()
            .map_err(|e| lock_error(path, "acquire", e))?;
        debug!(
            path = %path.display(),
            waited_ms = start.elapsed().as_millis() as u64,
            "scan lock acquired"
        );
        Ok(Self { file })
    }
}

fn lock_error(path: &Path, action: &str, e: std::io::Error) -> TreeRootsError {
    TreeRootsError::Io(std::io::Error::new(
        e.kind(),
        format!("{action} scan lock {}: {e}", path.display()),
    ))
}

impl Drop for ScanLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_handle_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SCAN_LOCK_FILE);
        let held = ScanLock::acquire(&path).unwrap();

        // A separate open file description conflicts with the held lock.
        let other = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(held);
        other.try_lock_exclusive().unwrap();
        other.unlock().unwrap();
        ScanLock::acquire(&path).unwrap();
    }
}
