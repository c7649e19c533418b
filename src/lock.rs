// src/lock.rs

//! Locking for lifecycle operations
//!
//! # Lock Strategy
//!
//! - **Identity Lock**: In-process table keyed by (holon id, version
//!   sequence). At most one lifecycle operation holds an identity at a time.
//!   The draft of a holon uses sequence 0.
//! - **Manifest Lock**: `holon.json.lock` next to a manifest file, held with
//!   `flock(LOCK_EX)` while the manifest is rewritten so other processes never
//!   observe a half-written file.
//!
//! Registry writes are serialized separately by SQLite transactions.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

/// Sequence number standing for the unpublished draft of a holon
pub const DRAFT_SEQUENCE: u32 = 0;

/// In-process table of identities with an operation in flight
#[derive(Debug)]
pub struct IdentityLocks {
    held: Mutex<HashSet<(Uuid, u32)>>,
    retries: u32,
    base_delay: Duration,
}

impl IdentityLocks {
    /// Table retrying `retries` times with exponential backoff
    ///
    /// Tries: 0ms, 50ms, 100ms, 200ms, ... before giving up.
    pub fn new(retries: u32) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            retries: retries.max(1),
            base_delay: Duration::from_millis(50),
        }
    }

    /// Override the first backoff delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn try_insert(&self, key: (Uuid, u32)) -> Result<bool> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| Error::OperationInProgress("identity lock table poisoned".to_string()))?;
        Ok(held.insert(key))
    }

    /// Acquire the identity, retrying with backoff
    ///
    /// Fails with `OperationInProgress` when another operation keeps the
    /// identity for the whole retry window.
    pub fn acquire(&self, id: Uuid, version_sequence: u32, operation: &str) -> Result<IdentityGuard<'_>> {
        let key = (id, version_sequence);

        for attempt in 0..self.retries {
            if self.try_insert(key)? {
                trace!("{} acquired identity {}@{}", operation, id, version_sequence);
                return Ok(IdentityGuard { locks: self, key });
            }
            if attempt < self.retries - 1 {
                let delay = self.base_delay * (1 << attempt.min(16));
                debug!(
                    "{}: identity {}@{} busy, retrying in {:?}",
                    operation, id, version_sequence, delay
                );
                std::thread::sleep(delay);
            }
        }

        Err(Error::OperationInProgress(format!(
            "{} could not acquire holon {} (version {}) after {} attempts",
            operation, id, version_sequence, self.retries
        )))
    }

    /// Whether an identity is currently held
    pub fn is_held(&self, id: Uuid, version_sequence: u32) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&(id, version_sequence)))
            .unwrap_or(true)
    }

    fn release(&self, key: (Uuid, u32)) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&key);
        }
    }
}

/// Held identity; released on drop
#[derive(Debug)]
pub struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    key: (Uuid, u32),
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(self.key);
        trace!("Released identity {}@{}", self.key.0, self.key.1);
    }
}

/// Advisory file lock guarding one manifest file
pub struct ManifestFileLock {
    /// The lock file handle (kept open to maintain lock)
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl ManifestFileLock {
    /// Lock file name for a manifest inside `dir`
    pub fn lock_path(dir: &Path) -> PathBuf {
        dir.join(format!("{}.lock", crate::manifest::MANIFEST_FILE))
    }

    /// Acquire the lock for the manifest in `dir`, blocking until available
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = Self::lock_path(dir);
        let file = File::create(&path)?;
        file.lock_exclusive()?;
        trace!("Acquired manifest lock at {:?}", path);
        Ok(Self { file, path })
    }

    /// Check if the lock is currently held by anyone
    pub fn is_held(dir: &Path) -> bool {
        let path = Self::lock_path(dir);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ManifestFileLock {
    fn drop(&mut self) {
        // Lock is released when the file is closed
        trace!("Released manifest lock at {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_identity_lock_released_on_drop() {
        let locks = IdentityLocks::new(1);
        let id = Uuid::new_v4();

        let guard = locks.acquire(id, 1, "install").unwrap();
        assert!(locks.is_held(id, 1));
        assert!(!locks.is_held(id, 2));
        drop(guard);
        assert!(!locks.is_held(id, 1));
    }

    #[test]
    fn test_contended_identity_fails_after_retries() {
        let locks = IdentityLocks::new(3).with_base_delay(Duration::from_millis(1));
        let id = Uuid::new_v4();

        let _guard = locks.acquire(id, DRAFT_SEQUENCE, "publish").unwrap();
        let err = locks.acquire(id, DRAFT_SEQUENCE, "delete").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInProgress);

        // Other versions of the same holon are independent
        assert!(locks.acquire(id, 1, "install").is_ok());
    }

    #[test]
    fn test_waiter_acquires_after_release() {
        let locks = Arc::new(IdentityLocks::new(8).with_base_delay(Duration::from_millis(5)));
        let id = Uuid::new_v4();
        let guard = locks.acquire(id, 1, "install").unwrap();

        let waiter = {
            let locks = locks.clone();
            std::thread::spawn(move || locks.acquire(id, 1, "uninstall").map(|_| ()))
        };
        std::thread::sleep(Duration::from_millis(10));
        drop(guard);

        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_manifest_lock_held_until_drop() {
        let temp = TempDir::new().unwrap();
        let lock = ManifestFileLock::acquire(temp.path()).unwrap();
        assert!(lock.path().ends_with("holon.json.lock"));
        assert!(ManifestFileLock::is_held(temp.path()));
        drop(lock);
        assert!(!ManifestFileLock::is_held(temp.path()));
    }
}
