// src/cache/mod.rs

//! Download cache
//!
//! A flat directory of verified package archives named
//! `name.arch.version.goo`. Working directories used while installing live
//! next to them as subdirectories. Writes stage to a temporary file in the
//! cache directory and are renamed into place only after the checksum
//! verifies, so a reader never observes a partial archive.

use crate::cancel::{CancelToken, CancellableReader, map_io_error};
use crate::error::{Error, Result};
use crate::hash::{self, HashingWriter};
use crate::packages::PackageIdent;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Archive file extension
pub const ARCHIVE_EXT: &str = "goo";

/// The on-disk download cache
#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
}

impl DownloadCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an archive for `ident` is stored at
    pub fn archive_path(&self, ident: &PackageIdent) -> PathBuf {
        self.dir.join(format!("{}.{}", ident, ARCHIVE_EXT))
    }

    /// Scratch directory used to unpack `ident`
    pub fn work_dir(&self, ident: &PackageIdent) -> PathBuf {
        self.dir.join(ident.to_string())
    }

    /// Whether `path` lies inside the cache directory
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.dir)
    }

    /// Return the cached archive for `ident` if its bytes hash to `checksum`
    pub fn lookup(&self, ident: &PackageIdent, checksum: &str) -> Option<PathBuf> {
        let path = self.archive_path(ident);
        self.verify_at(&path, checksum)
    }

    /// Return `path` if it is a cached archive whose bytes hash to `checksum`
    pub fn verify_at(&self, path: &Path, checksum: &str) -> Option<PathBuf> {
        if !path.is_file() {
            return None;
        }
        match hash::sha256_file(path) {
            Ok(actual) if hash::checksum_matches(checksum, &actual) => {
                debug!("Cache hit for {}", path.display());
                Some(path.to_path_buf())
            }
            Ok(actual) => {
                debug!(
                    "Cached {} has checksum {}, expected {}",
                    path.display(),
                    actual,
                    checksum
                );
                None
            }
            Err(e) => {
                warn!("Failed to hash cached {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Stream `reader` into the cache as the archive for `ident`
    ///
    /// The temp file is removed on checksum mismatch, I/O error or
    /// cancellation. Concurrent stores of the same identifier each stage
    /// their own temp file; the last rename wins.
    pub fn store<R: Read>(
        &self,
        ident: &PackageIdent,
        checksum: &str,
        reader: R,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let dest = self.archive_path(ident);

        let temp = NamedTempFile::new_in(&self.dir)?;
        let mut writer = HashingWriter::new(temp);
        let mut reader = CancellableReader::new(reader, cancel);
        io::copy(&mut reader, &mut writer).map_err(|e| match map_io_error(e, cancel) {
            Error::Io(e) => Error::DownloadError(format!("{}: {}", ident, e)),
            other => other,
        })?;
        let (temp, actual, size) = writer.finish();

        if !hash::checksum_matches(checksum, &actual) {
            // Dropping `temp` deletes the partial file
            return Err(Error::ChecksumMismatch {
                path: dest.display().to_string(),
                expected: checksum.to_string(),
                actual,
            });
        }

        temp.as_file().sync_all()?;
        temp.persist(&dest).map_err(|e| Error::Io(e.error))?;
        debug!("Stored {} ({} bytes) at {}", ident, size, dest.display());
        Ok(dest)
    }

    /// Delete a cache entry (file or directory) unconditionally
    pub fn remove(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        debug!("Removed cache entry {}", path.display());
        Ok(())
    }

    /// All top-level entries in the cache directory
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }
}
