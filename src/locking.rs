//! Cross-process locks for the installed-component tree.
//!
//! Each lock is an advisory OS file lock keyed by the exact versioned
//! install path, so concurrent installs of the same version serialize while
//! installs of different versions proceed independently. The guard releases
//! the lock on drop, on every exit path including errors.

use fs4::fs_std::FileExt;
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{DistributionError, Result};

/// Factory for scoped, named install locks.
#[derive(Debug, Clone)]
pub struct InstallLocks {
    locks_dir: PathBuf,
}

impl InstallLocks {
    pub fn new(locks_dir: PathBuf) -> Self {
        Self { locks_dir }
    }

    /// Blocks until the lock named by `key` is held exclusively.
    ///
    /// Callers on async tasks should run this inside `spawn_blocking`.
    pub fn acquire(&self, key: &Path) -> Result<InstallLockGuard> {
        let lock_path = self.locks_dir.join(format!("{}.lock", lock_file_stem(key)));

        std::fs::create_dir_all(&self.locks_dir)
            .map_err(|e| DistributionError::io(&self.locks_dir, e))?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| DistributionError::LockFailed {
                path: lock_path.clone(),
                reason: e.to_string(),
            })?;

        file.lock_exclusive()
            .map_err(|e| DistributionError::LockFailed {
                path: lock_path.clone(),
                reason: e.to_string(),
            })?;

        debug!("Acquired install lock {:?}", lock_path);
        Ok(InstallLockGuard {
            file,
            path: lock_path,
        })
    }
}

/// Derives a flat lock-file name from an install path.
fn lock_file_stem(key: &Path) -> String {
    key.to_string_lossy()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' { c } else { '-' })
        .collect()
}

/// Holds the lock until dropped.
pub struct InstallLockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for InstallLockGuard {
    fn drop(&mut self) {
        // Dropping the file would release the lock anyway; unlock explicitly
        // so failures are at least observable in logs.
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {:?}: {}", self.path, e);
        } else {
            debug!("Released install lock {:?}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = tempdir().unwrap();
        let locks = InstallLocks::new(dir.path().join("locks"));
        let guard = locks.acquire(Path::new("/root/engines/1.0.0")).unwrap();
        drop(guard);
        assert!(dir.path().join("locks").read_dir().unwrap().next().is_some());
    }

    #[test]
    fn test_same_key_serializes_holders() {
        let dir = tempdir().unwrap();
        let locks = InstallLocks::new(dir.path().join("locks"));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let concurrent = Arc::clone(&concurrent);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    let _guard = locks.acquire(Path::new("/root/engines/1.0.0")).unwrap();
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_keys_are_independent() {
        let dir = tempdir().unwrap();
        let locks = InstallLocks::new(dir.path().join("locks"));
        let _a = locks.acquire(Path::new("/root/engines/1.0.0")).unwrap();
        // A second, differently-keyed acquisition must not block.
        let _b = locks.acquire(Path::new("/root/engines/2.0.0")).unwrap();
    }

    #[test]
    fn test_lock_file_stem_is_filesystem_safe() {
        let stem = lock_file_stem(Path::new("/root/engines/1.0.0"));
        assert!(!stem.contains('/'));
        assert!(stem.contains("1.0.0"));
    }
}
