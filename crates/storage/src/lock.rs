//! Advisory exclusive lock scoped to a filesystem path.
//!
//! The lock is materialized as a sidecar `.lock` file taken with `fs2`
//! and brackets any sequence of reads and writes to the documents it
//! guards. It coordinates between processes; within a process each
//! manager additionally serializes through its own mutex.

use crate::error::StorageError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const BACKOFF_INITIAL: Duration = Duration::from_millis(10);
const BACKOFF_CAP: Duration = Duration::from_millis(100);

/// An advisory exclusive lock on a path's sidecar `.lock` file.
pub struct FileLock {
    lock_path: PathBuf,
    held: Mutex<Option<File>>,
}

impl FileLock {
    /// Creates a lock guarding `path`. The sidecar file is `path` with a
    /// `.lock` extension appended; it is created lazily on first use.
    pub fn new(path: &Path) -> Self {
        let mut name = path.as_os_str().to_os_string();
        name.push(".lock");
        Self {
            lock_path: PathBuf::from(name),
            held: Mutex::new(None),
        }
    }

    fn open_handle(&self) -> Result<File, StorageError> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| StorageError::io(&self.lock_path, e))
    }

    /// Acquires the lock, blocking until it is available.
    pub fn lock(&self) -> Result<(), StorageError> {
        let file = self.open_handle()?;
        file.lock_exclusive()
            .map_err(|e| StorageError::io(&self.lock_path, e))?;
        *self.held.lock().unwrap_or_else(|p| p.into_inner()) = Some(file);
        Ok(())
    }

    /// Attempts to acquire the lock without blocking. Returns whether the
    /// lock was taken.
    pub fn try_lock(&self) -> Result<bool, StorageError> {
        let file = self.open_handle()?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                *self.held.lock().unwrap_or_else(|p| p.into_inner()) = Some(file);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(StorageError::io(&self.lock_path, e)),
        }
    }

    /// Acquires the lock within `timeout`, polling with exponential
    /// backoff starting at 10 ms and capped at 100 ms.
    pub fn lock_with_timeout(&self, timeout: Duration) -> Result<(), StorageError> {
        let start = Instant::now();
        let mut backoff = BACKOFF_INITIAL;
        loop {
            if self.try_lock()? {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(StorageError::LockTimeout {
                    path: self.lock_path.clone(),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
            let remaining = timeout.saturating_sub(start.elapsed());
            std::thread::sleep(backoff.min(remaining));
            backoff = (backoff * 2).min(BACKOFF_CAP);
        }
    }

    /// Releases the lock. Releasing an unheld lock is a no-op.
    pub fn unlock(&self) {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(file) = held.take() {
            if let Err(e) = fs2::FileExt::unlock(&file) {
                tracing::warn!(target: "storage", path = %self.lock_path.display(), "unlock failed: {}", e);
            }
        }
    }

    /// Runs `f` with the lock held, releasing it on every exit path.
    pub fn with_lock<T, E: From<StorageError>>(
        &self,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        self.lock()?;
        let result = f();
        self.unlock();
        result
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_and_unlock() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("doc.json");
        let lock = FileLock::new(&target);
        lock.lock().unwrap();
        assert!(dir.path().join("doc.json.lock").exists());
        lock.unlock();
        lock.lock().unwrap();
        lock.unlock();
    }

    #[test]
    fn try_lock_reports_contention() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("doc.json");
        let a = FileLock::new(&target);
        let b = FileLock::new(&target);
        assert!(a.try_lock().unwrap());
        assert!(!b.try_lock().unwrap());
        a.unlock();
        assert!(b.try_lock().unwrap());
        b.unlock();
    }

    #[test]
    fn lock_with_timeout_expires() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("doc.json");
        let a = FileLock::new(&target);
        let b = FileLock::new(&target);
        a.lock().unwrap();
        let err = b.lock_with_timeout(Duration::from_millis(50)).unwrap_err();
        match err {
            StorageError::LockTimeout { waited_ms, .. } => assert!(waited_ms >= 50),
            other => panic!("unexpected error: {other}"),
        }
        a.unlock();
    }

    #[test]
    fn with_lock_releases_on_error() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("doc.json");
        let lock = FileLock::new(&target);
        let result: Result<(), StorageError> = lock.with_lock(|| {
            Err(StorageError::Document {
                path: target.clone(),
                reason: "boom".into(),
            })
        });
        assert!(result.is_err());
        // The failure path must have released the lock.
        assert!(lock.try_lock().unwrap());
        lock.unlock();
    }
}
