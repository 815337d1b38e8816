// tests/common/mod.rs

//! Shared fixtures: on-disk `file://` repositories built from real `.goo`
//! archives and a scratch installation root.

#![allow(dead_code)]

use googet::Manager;
use googet::config::Environment;
use googet::db::Database;
use googet::db::models::PackageState;
use googet::hash;
use googet::packages::{Arch, IdentPattern, PkgSpec, archive};
use googet::repository::client::MANIFEST_NAME;
use googet::repository::{RepoEntry, RepoIndex, RepositoryClient, join_url};
use googet::version::Version;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

pub fn spec(name: &str, version: &str) -> PkgSpec {
    PkgSpec::new(name, Arch::Noarch, Version::parse(version).unwrap())
}

pub fn depends(mut spec: PkgSpec, name: &str, min: &str) -> PkgSpec {
    spec.dependencies
        .insert(name.to_string(), Version::parse(min).unwrap());
    spec
}

pub fn replaces(mut spec: PkgSpec, pattern: &str) -> PkgSpec {
    spec.replaces.push(IdentPattern::parse(pattern).unwrap());
    spec
}

pub fn conflicts(mut spec: PkgSpec, pattern: &str) -> PkgSpec {
    spec.conflicts.push(IdentPattern::parse(pattern).unwrap());
    spec
}

/// A repository directory served over `file://`
pub struct TestRepo {
    pub name: String,
    pub dir: PathBuf,
    pub url: String,
    pub priority: i32,
    specs: Vec<PkgSpec>,
}

impl TestRepo {
    /// Publish `spec` with one payload file named after the package
    pub fn offer(&mut self, spec: PkgSpec) -> PkgSpec {
        let content = format!("{}\n", spec.ident());
        let name = spec.name.clone();
        self.offer_with(spec, &[(&name, content.as_bytes())])
    }

    /// Publish `spec` with the given archive members
    ///
    /// Members ending in `.sh` are scripts; everything else becomes a
    /// payload file.
    pub fn offer_with(&mut self, mut spec: PkgSpec, members: &[(&str, &[u8])]) -> PkgSpec {
        let archive_path = self.dir.join(&spec.source);
        archive::pack(File::create(&archive_path).unwrap(), members).unwrap();
        spec.checksum = hash::sha256_file(&archive_path).unwrap();
        for (path, data) in members {
            if !path.ends_with(".sh") {
                spec.files.insert(path.to_string(), hash::sha256_bytes(data));
            }
        }

        self.specs.retain(|s| s.ident() != spec.ident());
        self.specs.push(spec.clone());
        self.write_index();
        spec
    }

    /// Overwrite a published archive without updating its checksum
    pub fn corrupt(&self, spec: &PkgSpec) {
        fs::write(self.dir.join(&spec.source), b"not the published archive").unwrap();
    }

    /// The record an install of `spec` from this repo would have left
    pub fn installed_state(&self, spec: &PkgSpec) -> PackageState {
        let mut state = PackageState::new(spec.clone());
        state.download_url = join_url(&self.url, &spec.source).unwrap().to_string();
        state
    }

    pub fn entry(&self) -> RepoEntry {
        RepoEntry::new(&self.name, &self.url, self.priority)
    }

    fn write_index(&self) {
        let json = serde_json::to_vec_pretty(&self.specs).unwrap();
        fs::write(self.dir.join(MANIFEST_NAME), json).unwrap();
    }
}

/// A scratch installation root plus any number of repositories
pub struct Harness {
    pub dir: TempDir,
    pub env: Environment,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::with_root(dir.path().join("root"));
        env.archs = vec![Arch::X86_64, Arch::Noarch];
        env.script_timeout = Duration::from_secs(30);
        env.ensure_dirs().unwrap();
        Self { dir, env }
    }

    pub fn repo(&self, name: &str, priority: i32) -> TestRepo {
        let dir = self.dir.path().join("served").join(name);
        fs::create_dir_all(&dir).unwrap();
        let url = Url::from_directory_path(&dir).unwrap().to_string();
        let repo = TestRepo {
            name: name.to_string(),
            dir,
            url,
            priority,
            specs: Vec::new(),
        };
        repo.write_index();
        repo
    }

    pub fn client() -> RepositoryClient {
        RepositoryClient::with_settings(Duration::from_secs(5), None)
            .unwrap()
            .with_retry_delay(Duration::from_millis(1))
    }

    /// A manager over exactly these repositories
    pub fn manager(&self, repos: &[&TestRepo]) -> Manager {
        let entries = repos.iter().map(|r| r.entry()).collect();
        Manager::with_index(self.env.clone(), RepoIndex::from_entries(Self::client(), entries))
    }

    pub fn db(&self) -> Database {
        Database::open_env(&self.env).unwrap()
    }

    /// Replace the installed state
    pub fn seed(&self, states: &[PackageState]) {
        let mut db = self.db();
        db.write(states).unwrap();
        db.close().unwrap();
    }

    /// Installed identifiers, sorted
    pub fn installed(&self) -> Vec<String> {
        let db = self.db();
        let mut idents: Vec<String> = db
            .fetch_all(None)
            .unwrap()
            .iter()
            .map(|s| s.spec.ident().to_string())
            .collect();
        db.close().unwrap();
        idents.sort();
        idents
    }

    pub fn root_file(&self, relative: &str) -> PathBuf {
        self.env.root.join(relative)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.env.cache_dir
    }
}
