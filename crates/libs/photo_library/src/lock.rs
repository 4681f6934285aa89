use crate::{LibraryError, LibraryLayout};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use tracing::warn;

/// Process-singleton guard over the library tree.
///
/// Holds a file with this process's PID; released on drop, but only if the
/// file still carries our PID, so a force-taken lock is never deleted by
/// the losing process.
#[derive(Debug)]
pub struct LibraryLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl LibraryLock {
    pub fn acquire(layout: &LibraryLayout, force: bool) -> Result<Self, LibraryError> {
        let path = layout.lock_file();
        let pid = std::process::id();

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                write!(file, "{pid}")?;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path).unwrap_or_default().trim().to_owned();
                if !force {
                    return Err(LibraryError::LockHeld { pid: owner });
                }
                warn!("Overriding library lock held by process {owner}");
                fs::write(&path, pid.to_string())?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            pid,
            released: false,
        })
    }

    /// Delete the lock file if it still belongs to this process.
    pub fn release(mut self) -> Result<(), LibraryError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LibraryError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == self.pid.to_string() => {
                fs::remove_file(&self.path)?;
            }
            Ok(content) => {
                warn!(
                    "Not removing library lock: it now belongs to process {}",
                    content.trim()
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl Drop for LibraryLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("Failed to release library lock: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, LibraryLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = LibraryLayout::new(dir.path().to_path_buf());
        (dir, layout)
    }

    #[test]
    fn test_acquire_writes_own_pid() {
        let (_dir, layout) = layout();
        let lock = LibraryLock::acquire(&layout, false).unwrap();
        let content = fs::read_to_string(layout.lock_file()).unwrap();
        assert_eq!(content, std::process::id().to_string());
        lock.release().unwrap();
        assert!(!layout.lock_file().exists());
    }

    #[test]
    fn test_second_acquire_reports_owner() {
        let (_dir, layout) = layout();
        let _lock = LibraryLock::acquire(&layout, false).unwrap();
        let err = LibraryLock::acquire(&layout, false).unwrap_err();
        match err {
            LibraryError::LockHeld { pid } => {
                assert_eq!(pid, std::process::id().to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_force_takes_over_foreign_lock() {
        let (_dir, layout) = layout();
        fs::write(layout.lock_file(), "999999").unwrap();
        let lock = LibraryLock::acquire(&layout, true).unwrap();
        drop(lock);
        assert!(!layout.lock_file().exists());
    }

    #[test]
    fn test_release_leaves_foreign_lock_alone() {
        let (_dir, layout) = layout();
        let lock = LibraryLock::acquire(&layout, false).unwrap();
        // Another process force-took the lock in the meantime.
        fs::write(layout.lock_file(), "424242").unwrap();
        lock.release().unwrap();
        assert!(layout.lock_file().exists());
    }
}
