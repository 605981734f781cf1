//! Cross-process advisory locks.
//!
//! A named, exclusive lock shared by unrelated processes on the same
//! machine. The underlying primitive is an fs2 advisory file lock, which the
//! OS releases automatically when the holding process terminates; explicit
//! release is bookkeeping, not a correctness requirement.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// An exclusively held named lock. Dropping it releases the lock; process
/// termination (including abnormal termination) releases it too.
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

fn lock_path(name: &str) -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join("nimbus-locks");
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(format!("{name}.lock")))
}

impl ProcessLock {
    /// Attempt to acquire the named lock.
    ///
    /// Creates the underlying primitive if absent, attaches without
    /// disturbing it if present. Non-blocking acquisition returns `None`
    /// immediately when the lock is held elsewhere. Blocking acquisition
    /// waits until the lock is available, treating removal of the primitive
    /// while waiting as availability (the holder finished and cleaned up);
    /// any other wait failure returns `None`.
    ///
    /// Every failure path is "lock unavailable", never a crash; the OS error
    /// text is logged.
    pub fn acquire(name: &str, blocking: bool) -> Option<ProcessLock> {
        let path = match lock_path(name) {
            Ok(p) => p,
            Err(e) => {
                warn!("cannot prepare lock directory for {name}: {e}");
                return None;
            }
        };

        // Create-or-attach; an already-held lock stays held.
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) => {
                warn!("cannot open lock {}: {e}", path.display());
                return None;
            }
        };

        if blocking {
            if let Err(e) = file.lock_exclusive() {
                // The one allowed wait failure: the primitive was removed
                // out from under us, meaning the holder completed normally.
                if !path.exists() {
                    debug!("lock {name} removed while waiting, treating as acquired");
                } else {
                    warn!("waiting for lock {name} failed: {e}");
                    return None;
                }
            }
        } else if let Err(e) = file.try_lock_exclusive() {
            if e.kind() != ErrorKind::WouldBlock {
                warn!("acquiring lock {name} failed: {e}");
            }
            return None;
        }

        debug!("acquired process lock {name}");
        Some(ProcessLock { file, path })
    }

    /// Release the lock. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        // Local bookkeeping only; the lock file itself persists so waiters
        // attached to it keep a consistent primitive.
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            debug!("unlock {} failed: {e}", self.path.display());
        }
    }
}
