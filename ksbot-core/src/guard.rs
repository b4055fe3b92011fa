// File: ksbot-core/src/guard.rs
//
// Cross-process "one redemption run at a time" marker.
//
// The lock is a plain file created with create-new semantics. Its existence
// means a run is in progress. A process that dies without releasing it leaves
// the file behind and every later run reports "already running" until an
// operator deletes it. There is no staleness timeout.
//
// All file operations here are blocking `std::fs` calls, so `RunGuard` can
// release from `Drop`. Async callers go through `spawn_blocking`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Error;
use crate::storage::write_error;

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub owner: Uuid,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Handle on the lock file location. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking acquire. `Ok(None)` means another run holds the lock.
    pub fn try_acquire(&self) -> Result<Option<RunGuard>, Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| write_error(&self.path, e))?;
            }
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(write_error(&self.path, e)),
        };

        let info = LockInfo {
            owner: Uuid::new_v4(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let written = serde_json::to_vec(&info)
            .map_err(Error::from)
            .and_then(|bytes| {
                file.write_all(&bytes)
                    .and_then(|_| file.sync_all())
                    .map_err(|e| write_error(&self.path, e))
            });
        if let Err(e) = written {
            // We created the file, so it is ours to clean up.
            let _ = fs::remove_file(&self.path);
            return Err(e);
        }

        debug!(owner = %info.owner, path = %self.path.display(), "Run lock acquired");
        Ok(Some(RunGuard {
            lock: self.clone(),
            owner: info.owner,
            released: false,
        }))
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Who holds the lock, if anyone. Lock files written by other tools (or
    /// truncated by a crash) show up as an error, not as free.
    pub fn holder(&self) -> Result<Option<LockInfo>, Error> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| Error::StorageUnreadable {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageUnreadable {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Removes the lock file only if it still carries `owner`'s token.
    /// Returns whether a file was removed. Safe to call repeatedly.
    pub fn release(&self, owner: Uuid) -> Result<bool, Error> {
        let holder = match self.holder() {
            Ok(Some(info)) => info,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("Not releasing unrecognized run lock: {e}");
                return Ok(false);
            }
        };
        if holder.owner != owner {
            warn!(
                ours = %owner,
                theirs = %holder.owner,
                "Run lock belongs to another run; leaving it in place"
            );
            return Ok(false);
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(owner = %owner, "Run lock released");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(write_error(&self.path, e)),
        }
    }
}

/// Scoped ownership of the run lock. Dropping it releases the lock, so every
/// exit path of a run (including panics) gives the lock back.
#[derive(Debug)]
pub struct RunGuard {
    lock: RunLock,
    owner: Uuid,
    released: bool,
}

impl RunGuard {
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn release(&mut self) -> Result<(), Error> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.lock.release(self.owner).map(|_| ())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release run lock: {e}");
        }
    }
}
