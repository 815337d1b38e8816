// src/lock.rs

//! Process-wide installation lock
//!
//! Every GooGet process holds `<root>/googet.lock` exclusively while it
//! reads or mutates the database and cache. The lock is an advisory
//! `flock`/`LockFileEx` on an open handle, so the OS releases it when the
//! process exits, including on a crash.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Exclusive installation lock, released on drop
#[derive(Debug)]
pub struct InstallLock {
    /// The lock file handle (kept open to maintain lock)
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Try to take the lock without blocking
    ///
    /// Fails with [`Error::DbBusy`] when another process holds it.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                // Record the holder for operators; the lock itself is the flock
                file.set_len(0)?;
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!("Failed to record lock holder in {}: {}", path.display(), e);
                }
                info!("Acquired installation lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || is_lock_contended(&e) => {
                debug!("Installation lock already held at {}", path.display());
                Err(Error::DbBusy(format!(
                    "another googet process holds {}",
                    path.display()
                )))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// fs2 reports contention with the platform's raw error on some targets
fn is_lock_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
