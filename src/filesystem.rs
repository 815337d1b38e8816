// src/filesystem.rs

//! Path handling for package-supplied paths
//!
//! Paths in a package spec (payload files, scripts) come from the repository
//! and are untrusted. They are normalized to a relative path and joined
//! under a known directory; anything that would climb out is rejected.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Normalize an untrusted path to a non-empty relative path
///
/// Leading separators and `.` components are dropped; `..` and drive
/// prefixes are rejected.
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(Error::ParseError(format!(
                    "path '{}' escapes its directory",
                    path.display()
                )));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::ParseError(format!(
            "path '{}' is empty",
            path.display()
        )));
    }
    Ok(normalized)
}

/// Join an untrusted path under `base`
pub fn safe_join(base: &Path, untrusted: impl AsRef<Path>) -> Result<PathBuf> {
    Ok(base.join(sanitize_path(untrusted)?))
}

/// Remove now-empty parent directories of `path`, stopping at `stop_at`
pub fn remove_empty_parents(path: &Path, stop_at: &Path) {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == stop_at || !d.starts_with(stop_at) {
            break;
        }
        match fs::remove_dir(d) {
            Ok(()) => debug!("Removed empty directory {}", d.display()),
            Err(_) => break,
        }
        dir = d.parent();
    }
}

/// Remove a file, treating "already gone" as success
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("bin/tool.exe").unwrap(), PathBuf::from("bin/tool.exe"));
        assert_eq!(sanitize_path("/bin/./tool").unwrap(), PathBuf::from("bin/tool"));
        assert!(sanitize_path("../etc/passwd").is_err());
        assert!(sanitize_path("a/../../b").is_err());
        assert!(sanitize_path("").is_err());
        assert!(sanitize_path("/").is_err());
    }

    #[test]
    fn test_safe_join_stays_under_base() {
        let base = Path::new("/opt/root");
        assert_eq!(
            safe_join(base, "/data/file").unwrap(),
            PathBuf::from("/opt/root/data/file")
        );
        assert!(safe_join(base, "../outside").is_err());
    }

    #[test]
    fn test_remove_empty_parents_stops_at_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("a/keep"), b"x").unwrap();
        let file = nested.join("f");
        fs::write(&file, b"x").unwrap();

        assert!(remove_file_if_exists(&file).unwrap());
        assert!(!remove_file_if_exists(&file).unwrap());
        remove_empty_parents(&file, dir.path());

        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a").exists());
    }
}
