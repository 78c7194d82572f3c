//! Cross-process exclusive lock over the modem's serial device.
//!
//! Every process that talks to the modem (this gateway, the reset script's
//! callers, ad-hoc tooling) agrees on one lock file, by default the UUCP-style
//! `/var/lock/LCK..<device>`. The lock is an exclusive `flock(2)` on that file,
//! acquired by polling with a bounded wait and released when the guard drops.

use std::fmt;
use std::fs::File;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tokio::time::Instant;
use tracing::debug;

/// Delay between non-blocking lock attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {:.1}s waiting for lock {}", waited.as_secs_f64(), path.display())]
    Timeout { path: PathBuf, waited: Duration },
    #[error("lock file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Handle to the named lock. Cheap to clone; holds no OS resources itself.
#[derive(Debug, Clone)]
pub struct DeviceLock {
    path: PathBuf,
}

/// Proof of exclusive access. The `flock` is released on drop.
pub struct DeviceLockGuard {
    _lock: Flock<File>,
}

impl fmt::Debug for DeviceLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLockGuard").finish_non_exhaustive()
    }
}

impl DeviceLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait up to `timeout` for exclusive ownership.
    pub async fn acquire(&self, timeout: Duration) -> Result<DeviceLockGuard, LockError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut file = self.open()?;

        loop {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(lock) => {
                    debug!("lock {}: acquired", self.path.display());
                    return Ok(DeviceLockGuard { _lock: lock });
                }
                Err((f, errno)) if errno == Errno::EWOULDBLOCK || errno == Errno::EINTR => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout {
                            path: self.path.clone(),
                            waited: started.elapsed(),
                        });
                    }
                    file = f;
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err((_, errno)) => {
                    return Err(LockError::Io {
                        path: self.path.clone(),
                        source: io::Error::from(errno),
                    });
                }
            }
        }
    }

    fn open(&self) -> Result<File, LockError> {
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(&self.path)
            .map_err(|source| LockError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
