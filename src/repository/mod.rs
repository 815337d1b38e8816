// src/repository/mod.rs

//! Repository management and package downloading
//!
//! This module provides functionality for:
//! - Reading and writing `.repo` files in the repo directory
//! - Fetching repository manifests into an in-memory [`RepoMap`]
//! - Downloading package archives with retry support

pub mod client;
pub mod config;
pub mod index;

pub use client::RepositoryClient;
pub use config::{RepoEntry, RepoFile};
pub use index::RepoIndex;

use crate::error::{Error, Result};
use crate::packages::PkgSpec;
use std::collections::BTreeMap;
use url::Url;

/// Repository priority; higher wins
pub type Priority = i32;

pub const PRIORITY_DEFAULT: Priority = 500;
pub const PRIORITY_CANARY: Priority = 1000;
pub const PRIORITY_PIN: Priority = 1500;
pub const PRIORITY_ROLLBACK: Priority = 1500;

/// Parse a priority given as an integer or a named constant
pub fn parse_priority(s: &str) -> Result<Priority> {
    let s = s.trim();
    if let Ok(n) = s.parse::<Priority>() {
        return Ok(n);
    }
    match s.to_ascii_lowercase().as_str() {
        "default" => Ok(PRIORITY_DEFAULT),
        "canary" => Ok(PRIORITY_CANARY),
        "pin" => Ok(PRIORITY_PIN),
        "rollback" => Ok(PRIORITY_ROLLBACK),
        _ => Err(Error::ParseError(format!(
            "invalid priority '{}': expected an integer or Default, Canary, Pin, Rollback",
            s
        ))),
    }
}

/// One repository's manifest as fetched for this run
#[derive(Debug, Clone, PartialEq)]
pub struct Repo {
    /// Base URL the manifest was fetched from
    pub url: String,
    pub priority: Priority,
    /// Specs in manifest order
    pub packages: Vec<PkgSpec>,
}

impl Repo {
    pub fn new(url: impl Into<String>, priority: Priority, packages: Vec<PkgSpec>) -> Self {
        Self {
            url: url.into(),
            priority,
            packages,
        }
    }

    /// Fetchable URL of a spec's archive
    pub fn archive_url(&self, spec: &PkgSpec) -> Result<Url> {
        join_url(&self.url, &spec.source)
    }
}

/// Base URL to [`Repo`]
pub type RepoMap = BTreeMap<String, Repo>;

/// Join a path onto a repository base URL, treating the base as a directory
///
/// The result must stay under the base; absolute URLs, rooted paths and
/// `..` escapes are rejected.
pub fn join_url(base: &str, relative: &str) -> Result<Url> {
    let mut base = Url::parse(base)
        .map_err(|e| Error::ParseError(format!("invalid repository URL '{}': {}", base, e)))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let joined = base.join(relative).map_err(|e| {
        Error::ParseError(format!(
            "cannot join '{}' onto '{}': {}",
            relative, base, e
        ))
    })?;
    if relative.starts_with('/') || !joined.as_str().starts_with(base.as_str()) {
        return Err(Error::ParseError(format!(
            "'{}' escapes repository '{}'",
            relative, base
        )));
    }
    Ok(joined)
}
