//! Bounded retries for files that another program may hold open.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Windows `ERROR_SHARING_VIOLATION` / `ERROR_LOCK_VIOLATION`.
const SHARING_VIOLATION: i32 = 32;
const LOCK_VIOLATION: i32 = 33;

#[derive(Error, Debug)]
pub enum FileAccessError {
    #[error("{} is in use by another program (gave up after {attempts} attempts); close it and try again", path.display())]
    Busy { path: PathBuf, attempts: u32 },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How often and how patiently a busy file is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails with a non-busy error, or attempts run out.
    pub fn run<T>(
        &self,
        path: &Path,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> Result<T, FileAccessError> {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if is_busy(&err) => {
                    tracing::warn!(
                        path = %path.display(),
                        attempt,
                        attempts,
                        error = %err,
                        "file busy"
                    );
                    if attempt < attempts {
                        std::thread::sleep(self.delay);
                    }
                }
                Err(source) => {
                    return Err(FileAccessError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
        Err(FileAccessError::Busy {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

/// Whether an I/O error means "held by someone else, try later".
///
/// Windows reports a file opened elsewhere as a sharing/lock violation or as
/// access denied. Elsewhere access denied is a real permission problem.
pub fn is_busy(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    cfg!(windows)
        && (err.kind() == io::ErrorKind::PermissionDenied
            || matches!(err.raw_os_error(), Some(SHARING_VIOLATION | LOCK_VIOLATION)))
}
