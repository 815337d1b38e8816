// src/repository/index.rs

//! In-memory repository index
//!
//! Manifests are fetched once per process, in parallel, and kept for the
//! rest of the run. A repository whose manifest cannot be fetched is dropped
//! with a warning; resolution continues over the others.

use crate::error::{Error, Result};
use crate::repository::client::RepositoryClient;
use crate::repository::config::{self, RepoEntry};
use crate::repository::{Priority, Repo, RepoMap};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Where the index gets its repository list from
#[derive(Debug, Clone)]
enum Source {
    Dir(PathBuf),
    Entries(Vec<RepoEntry>),
}

/// Lazily populated [`RepoMap`]
#[derive(Debug)]
pub struct RepoIndex {
    client: RepositoryClient,
    source: Source,
    map: OnceLock<RepoMap>,
}

impl RepoIndex {
    /// Index over the `.repo` files in `repo_dir`
    pub fn new(client: RepositoryClient, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            source: Source::Dir(repo_dir.into()),
            map: OnceLock::new(),
        }
    }

    /// Index over an explicit list of repositories
    pub fn from_entries(client: RepositoryClient, entries: Vec<RepoEntry>) -> Self {
        Self {
            client,
            source: Source::Entries(entries),
            map: OnceLock::new(),
        }
    }

    pub fn client(&self) -> &RepositoryClient {
        &self.client
    }

    /// The repo map, fetching manifests on first use
    ///
    /// Only a malformed repo file is an error here; unreachable repositories
    /// are left out of the map.
    pub fn repos(&self) -> Result<&RepoMap> {
        if let Some(map) = self.map.get() {
            return Ok(map);
        }

        let entries = match &self.source {
            Source::Dir(dir) => config::list_repos(dir)?
                .into_iter()
                .map(|(_, entry)| entry)
                .collect(),
            Source::Entries(entries) => entries.clone(),
        };
        let map = self.fetch(&entries);
        Ok(self.map.get_or_init(|| map))
    }

    fn fetch(&self, entries: &[RepoEntry]) -> RepoMap {
        let targets = dedupe_by_url(entries);
        info!("Loading {} repository manifest(s)", targets.len());

        let fetched: Vec<(String, Priority, Result<Vec<_>>)> = targets
            .into_par_iter()
            .map(|(url, priority)| {
                let result = self.client.fetch_manifest(&url);
                (url, priority, result)
            })
            .collect();

        let mut map = RepoMap::new();
        for (url, priority, result) in fetched {
            match result {
                Ok(specs) => {
                    let mut packages = Vec::with_capacity(specs.len());
                    for spec in specs {
                        match spec.validate() {
                            Ok(()) => packages.push(spec),
                            Err(e) => warn!("Skipping invalid entry in {}: {}", url, e),
                        }
                    }
                    debug!("Repo {} (priority {}): {} package(s)", url, priority, packages.len());
                    map.insert(url.clone(), Repo::new(url, priority, packages));
                }
                Err(e @ Error::RepoUnavailable(_)) => warn!("Dropping repository: {}", e),
                Err(e) => warn!("Dropping repository {}: {}", url, e),
            }
        }

        if map.is_empty() && !entries.is_empty() {
            warn!("No repository could be loaded");
        }
        map
    }
}

/// One fetch per URL; when the same URL is listed twice the highest
/// priority applies
fn dedupe_by_url(entries: &[RepoEntry]) -> Vec<(String, Priority)> {
    let mut by_url: BTreeMap<String, Priority> = BTreeMap::new();
    for entry in entries {
        by_url
            .entry(entry.url.clone())
            .and_modify(|p| {
                debug!("Repo {} listed more than once", entry.url);
                *p = (*p).max(entry.priority);
            })
            .or_insert(entry.priority);
    }
    by_url.into_iter().collect()
}
