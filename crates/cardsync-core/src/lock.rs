//! Advisory per-ID lock held for the duration of a reconciliation pass.
//!
//! The lock is an exclusive, non-blocking `flock` on `.cards/locks/<ID>.lock`,
//! so two passes over the same ID cannot overlap. The OS releases it when the
//! holding process exits, so a killed or crashed pass never leaves the card
//! locked. The file is kept between passes; while held it records the owner's
//! pid and acquisition time for humans inspecting it.

use crate::error::{CardError, Result};
use crate::paths;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// RAII guard for an exclusively held card lock.
#[derive(Debug)]
pub struct CardLock {
    id: String,
    path: PathBuf,
    file: File,
}

impl CardLock {
    /// Take the lock for `id`, or fail with `Locked` if another pass holds it.
    pub fn acquire(root: &Path, id: &str) -> Result<Self> {
        paths::validate_id(id)?;
        let path = paths::lock_path(root, id);
        crate::io::ensure_dir(&paths::locks_dir(root))?;

        // Never truncate before the lock is ours: the holder's record lives here.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if !try_flock_exclusive(&file)? {
            return Err(CardError::Locked(id.to_string()));
        }

        let stamp = format!(
            "pid: {}\nacquired_at: {}\n",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        file.set_len(0)?;
        file.write_all(stamp.as_bytes())?;

        tracing::debug!(id, "lock acquired");
        Ok(Self {
            id: id.to_string(),
            path,
            file,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CardLock {
    fn drop(&mut self) {
        // The flock itself is released when `file` closes.
        if let Err(e) = self.file.set_len(0) {
            tracing::warn!(id = %self.id, error = %e, "failed to clear lock record");
        }
    }
}

/// Try to take an exclusive flock on `file` without blocking.
///
/// Returns `Ok(false)` if another open file description holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: `flock` only reads the descriptor, which `file` owns and
        // keeps open for the duration of the call.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}
