//! Advisory lock serializing EC access between processes
//!
//! The EC cannot queue host commands, so every tool talking to it (this one,
//! ectool, flashrom, power daemons) takes an exclusive `flock` on a shared lock
//! file around each transaction. The lock is only advisory.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::clock::{poll_until, Clock};

pub const DEFAULT_LOCK_PATH: &str = "/run/lock/cros_ec_lock";
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
/// Delay between attempts while another process holds the lock
const LOCK_RETRY_US: u64 = 50_000;

#[derive(Debug)]
pub enum LockError {
    Open { path: PathBuf, source: std::io::Error },
    Timeout { path: PathBuf, waited_ms: u64 },
    Flock(Errno),
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Open { path, source } => {
                write!(f, "Cannot open lock file {}: {}", path.display(), source)
            }
            LockError::Timeout { path, waited_ms } => write!(
                f,
                "Timed out after {} ms waiting for lock {}",
                waited_ms,
                path.display()
            ),
            LockError::Flock(errno) => write!(f, "flock failed: {}", errno),
        }
    }
}

impl std::error::Error for LockError {}

/// Held lock, released when dropped
pub struct EcLock {
    _guard: Flock<File>,
    path: PathBuf,
}

impl EcLock {
    /// Take the lock, waiting at most `timeout_ms` for another holder to let go
    pub fn acquire(path: &Path, timeout_ms: u64, clock: &dyn Clock) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o666)
            .open(path)
            .map_err(|source| LockError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let mut file = Some(file);
        let mut guard = None;
        let res = poll_until(clock, timeout_ms.saturating_mul(1000), LOCK_RETRY_US, || {
            let f = file.take().ok_or(LockError::Flock(Errno::EBADF))?;
            match Flock::lock(f, FlockArg::LockExclusiveNonblock) {
                Ok(locked) => {
                    guard = Some(locked);
                    Ok(true)
                }
                Err((f, errno)) if errno == Errno::EWOULDBLOCK || errno == Errno::EINTR => {
                    file = Some(f);
                    Ok(false)
                }
                Err((_, errno)) => Err(LockError::Flock(errno)),
            }
        })?;

        match (res, guard) {
            (Ok(()), Some(guard)) => {
                trace!("Acquired {}", path.display());
                Ok(EcLock {
                    _guard: guard,
                    path: path.to_path_buf(),
                })
            }
            (Err(timeout), _) => {
                warn!("Could not acquire {}, someone else holds it", path.display());
                Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited_ms: timeout.waited_us / 1000,
                })
            }
            (Ok(()), None) => Err(LockError::Flock(Errno::EBADF)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EcLock {
    fn drop(&mut self) {
        trace!("Releasing {}", self.path.display());
    }
}
