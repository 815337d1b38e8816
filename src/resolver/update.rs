// src/resolver/update.rs

//! Update computation
//!
//! An update is emitted whenever the winning repository version differs
//! from the installed one, in either direction.

use crate::db::models::PackageMap;
use crate::error::{Error, Result};
use crate::packages::PackageKey;
use crate::repository::RepoMap;
use crate::resolver::graph::ResolvedPackage;
use crate::resolver::selector;
use crate::version::Version;
use std::cmp::Ordering;
use tracing::debug;

/// One installed package whose winning version differs
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub key: PackageKey,
    pub installed: Version,
    pub target: ResolvedPackage,
}

impl Update {
    pub fn available(&self) -> &Version {
        &self.target.spec.version
    }

    /// Whether the winning version is older than the installed one
    pub fn is_rollback(&self) -> bool {
        self.available().cmp(&self.installed) == Ordering::Less
    }
}

/// Run latest-version selection for every installed package
///
/// Packages no repository offers are skipped.
pub fn compute_updates(installed: &PackageMap, repos: &RepoMap) -> Result<Vec<Update>> {
    let mut updates = Vec::new();

    for (key, version) in installed {
        let candidate = match selector::select_latest(&key.name, key.arch, repos) {
            Ok(c) => c,
            Err(Error::NoCandidate(msg)) => {
                debug!("No update source for {}: {}", key, msg);
                continue;
            }
            Err(e) => return Err(e),
        };

        if candidate.spec.version == *version {
            continue;
        }

        debug!(
            "{} {} -> {} from {}",
            key, version, candidate.spec.version, candidate.repo.url
        );
        updates.push(Update {
            key: key.clone(),
            installed: version.clone(),
            target: ResolvedPackage::from_candidate(candidate)?,
        });
    }

    Ok(updates)
}
