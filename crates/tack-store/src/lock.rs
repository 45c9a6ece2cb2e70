//! Advisory file locks with a bounded wait.
//!
//! Locks are `flock`-style exclusive locks on a dedicated lock file. Every
//! acquisition opens its own file handle, so two threads of one process
//! exclude each other exactly like two processes do.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use tack_core::error::BoardError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

/// An exclusive lock held until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on `path`, creating the file if needed.
    /// The parent directory must already exist; it is never created here.
    ///
    /// Polls with exponential backoff until `timeout` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Lock`] on timeout and [`BoardError::Io`] if
    /// the lock file cannot be opened or locking fails for another reason.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, BoardError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let start = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(
                        lock = %path.display(),
                        attempts,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "lock acquired"
                    );
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        return Err(BoardError::Lock(format!(
                            "timed out acquiring {} after {:.2}s ({attempts} attempts)",
                            path.display(),
                            elapsed.as_secs_f64(),
                        )));
                    }
                    std::thread::sleep(backoff.min(timeout - elapsed));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(BoardError::Io(e)),
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the locked file is still the one linked at [`Self::path`].
    ///
    /// A waiter can end up holding a lock on a file that was unlinked while
    /// it waited; such a lock excludes nobody.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`] if either file cannot be inspected.
    pub fn is_current(&self) -> Result<bool, BoardError> {
        let linked = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(BoardError::Io(e)),
        };
        Ok(same_file(&self.file.metadata()?, &linked))
    }
}

#[cfg(unix)]
fn same_file(held: &fs::Metadata, linked: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    held.dev() == linked.dev() && held.ino() == linked.ino()
}

// Open files cannot be unlinked here, so a linked path is the held file.
#[cfg(not(unix))]
fn same_file(_held: &fs::Metadata, _linked: &fs::Metadata) -> bool {
    true
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
