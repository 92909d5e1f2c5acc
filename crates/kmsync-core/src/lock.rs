//! Process-exclusive lockfile over a ManagedRoot's `.kmsync/` directory.
//!
//! No fs2/fd-lock-style advisory-locking crate is part of this stack, so the
//! lock is a PID-stamped file created with `create_new` (which fails if the
//! file already exists). The guard's `Drop` releases the lock on every exit
//! path, including panics during the held section. Reclaiming a stale lock
//! left behind by a crashed holder is out of scope: spec.md §5 only requires
//! that the lockfile prevent two engines from mutating `.kmsync/` at once,
//! and a PID-liveness check would be the only `unsafe` code in this crate.
//! A stuck lock is instead cleared by removing `<kmsync_dir>/lock` by hand.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{KmsyncError, Result};

const LOCK_FILE: &str = "lock";

pub struct RootLock {
    path: PathBuf,
}

impl RootLock {
    /// Attempts to acquire the lock at `<kmsync_dir>/lock`.
    pub fn acquire(kmsync_dir: &Path) -> Result<Self> {
        fs::create_dir_all(kmsync_dir).map_err(|e| KmsyncError::io(kmsync_dir, e))?;
        let path = kmsync_dir.join(LOCK_FILE);

        match try_create(&path) {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let pid = read_holder_pid(&path).unwrap_or(0);
                Err(KmsyncError::LockHeld { pid })
            }
            Err(e) => Err(KmsyncError::io(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    write!(file, "{}", std::process::id())?;
    file.sync_all()?;
    Ok(())
}

fn read_holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let temp = TempDir::new().unwrap();
        {
            let _lock = RootLock::acquire(temp.path()).unwrap();
            assert!(temp.path().join(LOCK_FILE).exists());
        }
        assert!(!temp.path().join(LOCK_FILE).exists());
        let _lock2 = RootLock::acquire(temp.path()).unwrap();
    }

    #[test]
    fn concurrent_acquire_fails_while_held() {
        let temp = TempDir::new().unwrap();
        let _lock = RootLock::acquire(temp.path()).unwrap();
        let err = RootLock::acquire(temp.path()).unwrap_err();
        assert!(matches!(err, KmsyncError::LockHeld { .. }));
    }

    #[test]
    fn held_lock_reports_the_stamped_holder_pid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LOCK_FILE);
        fs::write(&path, "999999999").unwrap();
        let err = RootLock::acquire(temp.path()).unwrap_err();
        assert!(matches!(err, KmsyncError::LockHeld { pid: 999999999 }));
    }
}
