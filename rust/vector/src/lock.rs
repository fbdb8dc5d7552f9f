// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Advisory lock for read-write opens.
//!
//! The lock file records the owning process id and user. A lock whose
//! process is gone is stale and is taken over. A lock held by this same
//! process is refused like any other live lock. Checking and writing are two
//! separate steps, so two processes can both win a race; the lock only keeps
//! honest callers apart.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the lock file inside a map directory.
pub const LOCK_FILE: &str = "lock";

/// Owner recorded in a lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub pid: u32,
    pub user: String,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".into()),
        }
    }

    fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let pid = parts.next()?.parse().ok()?;
        let user = parts.next().unwrap_or("unknown").to_string();
        Some(Self { pid, user })
    }
}

/// Held lock; the file is removed on drop.
#[derive(Debug)]
pub struct MapLock {
    path: PathBuf,
    owner: LockOwner,
}

impl MapLock {
    /// Locks the map directory `dir`.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let me = LockOwner::current();

        if let Ok(text) = fs::read_to_string(&path) {
            match LockOwner::parse(&text) {
                Some(owner) if owner.pid == me.pid || process_alive(owner.pid) => {
                    return Err(Error::Locked {
                        path: dir.to_path_buf(),
                        pid: owner.pid,
                        user: owner.user,
                    });
                }
                Some(owner) => {
                    tracing::warn!(
                        pid = owner.pid,
                        user = %owner.user,
                        path = %path.display(),
                        "Taking over stale lock"
                    );
                }
                None => {
                    tracing::warn!(path = %path.display(), "Replacing unreadable lock file");
                }
            }
        }

        fs::write(&path, format!("{} {}\n", me.pid, me.user))?;
        tracing::debug!(pid = me.pid, path = %path.display(), "Locked map");
        Ok(Self { path, owner: me })
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }
}

impl Drop for MapLock {
    fn drop(&mut self) {
        // Leave a lock that another process has taken over in place.
        let ours = fs::read_to_string(&self.path)
            .ok()
            .and_then(|t| LockOwner::parse(&t))
            .is_some_and(|o| o.pid == self.owner.pid);
        if ours {
            if let Err(e) = fs::remove_file(&self.path) {
                let path = self.path.display();
                tracing::warn!(error = %e, %path, "Failed to remove lock file");
            }
        }
    }
}

/// Liveness of a process id. Without `/proc` every recorded process counts
/// as alive.
fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.is_dir() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let lock = MapLock::acquire(dir.path()).unwrap();
            assert_eq!(lock.owner().pid, std::process::id());
            assert!(dir.path().join(LOCK_FILE).exists());
        }
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        // Pid numbers beyond the kernel's pid_max are never alive.
        fs::write(dir.path().join(LOCK_FILE), "4294967295 ghost\n").unwrap();
        if Path::new("/proc").is_dir() {
            let lock = MapLock::acquire(dir.path()).unwrap();
            assert_eq!(lock.owner().pid, std::process::id());
        }
    }

    #[test]
    fn second_lock_in_one_process_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = MapLock::acquire(dir.path()).unwrap();
        let err = MapLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Locked { pid, .. } if pid == std::process::id()));
        assert!(dir.path().join(LOCK_FILE).exists());

        drop(first);
        assert!(!dir.path().join(LOCK_FILE).exists());
        assert!(MapLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn live_foreign_lock_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        // Pid 1 always exists.
        fs::write(dir.path().join(LOCK_FILE), "1 root\n").unwrap();
        let err = MapLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Locked { pid: 1, .. }));
        // The foreign lock survives the failed attempt.
        assert!(dir.path().join(LOCK_FILE).exists());
    }
}
