// src/clean.rs

//! Garbage collection over the download cache
//!
//! The database is read but never written here: cleaning selected packages
//! can leave a recorded `local_path` pointing at a file that no longer
//! exists, and reinstalls fall back to downloading again.

use crate::cache::DownloadCache;
use crate::db::models::PackageState;
use crate::error::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Which cache entries to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanMode {
    /// Every entry in the cache directory
    All,
    /// The recorded archives of installed packages with these names
    Packages(BTreeSet<String>),
    /// Every entry not recorded as the archive of an installed package
    Uninstalled,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Delete cache entries according to `mode`
///
/// Failures on individual entries are logged and skipped.
pub fn clean(cache: &DownloadCache, installed: &[PackageState], mode: &CleanMode) -> Result<CleanReport> {
    let targets: Vec<PathBuf> = match mode {
        CleanMode::All => cache.entries()?,
        CleanMode::Packages(names) => installed
            .iter()
            .filter(|s| names.contains(&s.spec.name))
            .filter_map(|s| s.local_path.clone())
            .filter(|p| {
                let inside = cache.contains(p);
                if !inside {
                    warn!("Skipping {}: not inside the cache", p.display());
                }
                inside && p.exists()
            })
            .collect(),
        CleanMode::Uninstalled => {
            let keep: BTreeSet<&PathBuf> =
                installed.iter().filter_map(|s| s.local_path.as_ref()).collect();
            cache
                .entries()?
                .into_iter()
                .filter(|p| !keep.contains(p))
                .collect()
        }
    };

    let mut report = CleanReport::default();
    for path in targets {
        match cache.remove(&path) {
            Ok(()) => report.removed.push(path),
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                report.failed.push(path);
            }
        }
    }

    debug!("Clean {:?} finished with {} failure(s)", mode, report.failed.len());
    info!("Removed {} cache entries", report.removed.len());
    Ok(report)
}
