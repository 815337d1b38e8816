// src/transaction/installer.rs

//! Executes resolver plans against the installation root

use super::{OpKind, OpState, PackageOp};
use crate::cache::DownloadCache;
use crate::config::{CONFIG_FILE, Environment};
use crate::db::Database;
use crate::db::models::PackageState;
use crate::error::{Error, Result};
use crate::filesystem;
use crate::hash;
use crate::packages::{PackageIdent, PackageKey, PkgSpec, archive};
use crate::repository::RepositoryClient;
use crate::resolver::{Plan, PlannedInstall};
use crate::scriptlet::{Phase, ScriptRunner};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// An archive ready in the cache
#[derive(Debug, Clone)]
struct Fetched {
    path: PathBuf,
    downloaded: bool,
}

/// A payload file checked and ready to copy
struct StagedFile {
    source: PathBuf,
    dest: PathBuf,
    checksum: String,
}

/// One reversible step of placing files
enum Undo {
    Created(PathBuf),
    Replaced { dest: PathBuf, backup: PathBuf },
}

/// What [`Installer::execute`] did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExecutionReport {
    pub removed: Vec<PackageKey>,
    pub installed: Vec<PackageIdent>,
    pub reinstalled: Vec<PackageIdent>,
}

impl ExecutionReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.installed.is_empty() && self.reinstalled.is_empty()
    }

    pub fn extend(&mut self, other: ExecutionReport) {
        self.removed.extend(other.removed);
        self.installed.extend(other.installed);
        self.reinstalled.extend(other.reinstalled);
    }
}

/// Result of checking an installed package against its record
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub ident: PackageIdent,
    pub missing: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    /// `None` when the package declares no verify script
    pub script_ok: Option<bool>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.modified.is_empty() && self.script_ok != Some(false)
    }
}

/// Drives package operations through the state machine
///
/// Downloads may run in parallel; every mutation of the root or the
/// database happens serially on the calling thread.
pub struct Installer<'a> {
    env: &'a Environment,
    db: &'a mut Database,
    client: &'a RepositoryClient,
    cache: DownloadCache,
    scripts: ScriptRunner,
}

impl<'a> Installer<'a> {
    pub fn new(env: &'a Environment, db: &'a mut Database, client: &'a RepositoryClient) -> Self {
        Self {
            cache: DownloadCache::new(&env.cache_dir),
            scripts: ScriptRunner::new(&env.root, env.script_timeout, env.cancel.clone()),
            env,
            db,
            client,
        }
    }

    /// Run a plan: removals, then installs, then reinstalls
    ///
    /// Every archive is fetched and verified before the first mutation. The
    /// first failure aborts the rest of the plan; packages already recorded
    /// stay recorded.
    pub fn execute(&mut self, plan: &Plan, dbonly: bool) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        if plan.is_empty() {
            return Ok(report);
        }

        let mut fetched = self.prefetch(&plan.installs)?;

        for key in &plan.removals {
            self.env.cancel.check()?;
            self.remove(key, dbonly)?;
            report.removed.push(key.clone());
        }

        for planned in &plan.installs {
            self.env.cancel.check()?;
            let prefetched = fetched.remove(&planned.spec().key());
            report.installed.push(self.install_with(planned, prefetched)?);
        }

        for key in &plan.reinstalls {
            self.env.cancel.check()?;
            report.reinstalled.push(self.reinstall(key)?);
        }

        Ok(report)
    }

    /// Fetch every archive of `installs` into the cache in parallel
    fn prefetch(&self, installs: &[PlannedInstall]) -> Result<BTreeMap<PackageKey, Fetched>> {
        let cache = &self.cache;
        let client = self.client;
        let cancel = &self.env.cancel;

        installs
            .par_iter()
            .map(|planned| -> Result<(PackageKey, Fetched)> {
                let spec = planned.spec();
                let ident = spec.ident();
                let fetched = match cache.lookup(&ident, &spec.checksum) {
                    Some(path) => Fetched {
                        path,
                        downloaded: false,
                    },
                    None => Fetched {
                        path: client.download(
                            &planned.package.download_url,
                            &ident,
                            &spec.checksum,
                            cache,
                            cancel,
                        )?,
                        downloaded: true,
                    },
                };
                Ok((spec.key(), fetched))
            })
            .collect()
    }

    /// Install one resolved package, upgrading any installed version
    pub fn install(&mut self, planned: &PlannedInstall) -> Result<PackageIdent> {
        self.install_with(planned, None)
    }

    fn install_with(
        &mut self,
        planned: &PlannedInstall,
        prefetched: Option<Fetched>,
    ) -> Result<PackageIdent> {
        let spec = planned.spec();
        let mut op = PackageOp::new(spec.ident(), OpKind::Install);

        let fetched = match prefetched {
            Some(f) => f,
            None => self
                .fetch(spec, &planned.package.download_url)
                .map_err(|e| op.fail(e))?,
        };
        let download_url = planned.package.download_url.to_string();

        self.apply(&mut op, spec, &fetched, &download_url)
            .map_err(|e| op.fail(e))?;
        Ok(op.ident().clone())
    }

    /// Reinstall an installed package from its recorded archive or source
    pub fn reinstall(&mut self, key: &PackageKey) -> Result<PackageIdent> {
        let state = self.db.fetch_one(key)?;
        let mut op = PackageOp::new(state.spec.ident(), OpKind::Reinstall);

        let fetched = self.archive_for(&state).map_err(|e| op.fail(e))?;
        self.apply(&mut op, &state.spec, &fetched, &state.download_url)
            .map_err(|e| op.fail(e))?;
        Ok(op.ident().clone())
    }

    /// Remove an installed package
    ///
    /// With `dbonly` the uninstall script and file deletion are skipped and
    /// only the record is dropped.
    pub fn remove(&mut self, key: &PackageKey, dbonly: bool) -> Result<()> {
        let state = self.db.fetch_one(key)?;
        let mut op = PackageOp::new(state.spec.ident(), OpKind::Remove);
        self.remove_inner(&mut op, &state, dbonly)
            .map_err(|e| op.fail(e))
    }

    fn remove_inner(&mut self, op: &mut PackageOp, state: &PackageState, dbonly: bool) -> Result<()> {
        let spec = &state.spec;

        if dbonly {
            info!("Removing {} from the database only", spec);
        } else {
            if let Some(script) = &spec.uninstall {
                op.advance(OpState::ScriptRunning)?;
                let fetched = self.archive_for(state)?;
                let work_dir = self.unpack(spec, &fetched.path)?;
                let result = self
                    .scripts
                    .run(Phase::Uninstall, spec, script, &work_dir, None);
                self.discard_work_dir(&work_dir);
                result?;
            }
            self.delete_files(state.installed_files.keys());
        }

        self.db.delete(&state.key())?;
        op.advance(OpState::Deleted)?;
        op.advance(OpState::Done)?;
        info!("Removed {}", spec);
        Ok(())
    }

    /// Check installed files against their recorded checksums and run the
    /// package's verify script
    pub fn verify(&self, key: &PackageKey) -> Result<VerifyReport> {
        let state = self.db.fetch_one(key)?;
        let mut report = VerifyReport {
            ident: state.spec.ident(),
            missing: Vec::new(),
            modified: Vec::new(),
            script_ok: None,
        };

        for (path, checksum) in &state.installed_files {
            if !path.exists() {
                report.missing.push(path.clone());
                continue;
            }
            match hash::sha256_file(path) {
                Ok(actual) if hash::checksum_matches(checksum, &actual) => {}
                Ok(_) => report.modified.push(path.clone()),
                Err(e) => {
                    warn!("Failed to hash {}: {}", path.display(), e);
                    report.modified.push(path.clone());
                }
            }
        }

        if let Some(script) = &state.spec.verify {
            let fetched = self.archive_for(&state)?;
            let work_dir = self.unpack(&state.spec, &fetched.path)?;
            let result = self
                .scripts
                .run(Phase::Verify, &state.spec, script, &work_dir, None);
            self.discard_work_dir(&work_dir);
            report.script_ok = match result {
                Ok(_) => Some(true),
                Err(Error::ScriptError(msg)) => {
                    warn!("{}", msg);
                    Some(false)
                }
                Err(e) => return Err(e),
            };
        }

        Ok(report)
    }

    /// Verified archive -> files on disk -> script -> durable record
    fn apply(
        &mut self,
        op: &mut PackageOp,
        spec: &PkgSpec,
        fetched: &Fetched,
        download_url: &str,
    ) -> Result<()> {
        if fetched.downloaded {
            op.advance(OpState::Downloading)?;
        }
        op.advance(OpState::Verified)?;

        let previous = self.db.find(&spec.key())?;
        op.advance(OpState::ScriptRunning)?;

        let work_dir = self.unpack(spec, &fetched.path)?;
        let result = self.place_and_record(spec, &work_dir, fetched, download_url, previous.as_ref());
        self.discard_work_dir(&work_dir);
        let state = result?;

        op.advance(OpState::Recorded)?;

        if let Some(previous) = &previous {
            let stale = previous
                .installed_files
                .keys()
                .filter(|p| !state.installed_files.contains_key(*p));
            self.delete_files(stale);
        }

        op.advance(OpState::Done)?;
        match &previous {
            Some(p) if p.spec.version != spec.version => {
                info!("Installed {} (was {})", spec, p.spec.version)
            }
            _ => info!("Installed {}", spec),
        }
        Ok(())
    }

    fn place_and_record(
        &mut self,
        spec: &PkgSpec,
        work_dir: &Path,
        fetched: &Fetched,
        download_url: &str,
        previous: Option<&PackageState>,
    ) -> Result<PackageState> {
        let staged = self.preflight(spec, work_dir)?;
        let backup_dir = tempfile::Builder::new()
            .prefix(".rollback-")
            .tempdir_in(&self.env.cache_dir)?;

        let mut undo = Vec::new();
        let result = self
            .place_files(spec, work_dir, &staged, backup_dir.path(), previous, &mut undo)
            .and_then(|exit_code| {
                let mut state = PackageState::new(spec.clone());
                state.local_path = self
                    .cache
                    .contains(&fetched.path)
                    .then(|| fetched.path.clone());
                state.download_url = download_url.to_string();
                state.checksum = spec.checksum.to_ascii_lowercase();
                state.installed_files = staged
                    .iter()
                    .map(|f| (f.dest.clone(), f.checksum.clone()))
                    .collect();
                state.install_exit_code = exit_code;
                self.db.upsert(&state)?;
                Ok(state)
            });

        if result.is_err() && !undo.is_empty() {
            warn!("Rolling back {} file(s) placed by {}", undo.len(), spec);
            self.roll_back(undo);
        }
        result
    }

    /// Copy staged files into the root and run the install script
    ///
    /// Files that already exist are copied into `backup_dir` first; `undo`
    /// records every step in order.
    fn place_files(
        &self,
        spec: &PkgSpec,
        work_dir: &Path,
        staged: &[StagedFile],
        backup_dir: &Path,
        previous: Option<&PackageState>,
        undo: &mut Vec<Undo>,
    ) -> Result<Option<i32>> {
        for (i, file) in staged.iter().enumerate() {
            if file.dest.exists() {
                let backup = backup_dir.join(i.to_string());
                fs::copy(&file.dest, &backup)?;
                undo.push(Undo::Replaced {
                    dest: file.dest.clone(),
                    backup,
                });
            } else {
                if let Some(parent) = file.dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                undo.push(Undo::Created(file.dest.clone()));
            }
            fs::copy(&file.source, &file.dest)?;
            debug!("Placed {}", file.dest.display());
        }

        match &spec.install {
            Some(script) => Ok(Some(self.scripts.run(
                Phase::Install,
                spec,
                script,
                work_dir,
                previous.map(|p| &p.spec.version),
            )?)),
            None => Ok(None),
        }
    }

    /// Undo placed files, newest first
    fn roll_back(&self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Created(path) => self.delete_files(std::iter::once(&path)),
                Undo::Replaced { dest, backup } => match fs::copy(&backup, &dest) {
                    Ok(_) => debug!("Restored {}", dest.display()),
                    Err(e) => warn!("Failed to restore {}: {}", dest.display(), e),
                },
            }
        }
    }

    /// Check every payload file before anything is copied
    fn preflight(&self, spec: &PkgSpec, work_dir: &Path) -> Result<Vec<StagedFile>> {
        let key = spec.key();
        let mut staged = Vec::with_capacity(spec.files.len());

        for (relative, expected) in &spec.files {
            let source = filesystem::safe_join(work_dir, relative)?;
            if !source.is_file() {
                return Err(Error::ParseError(format!(
                    "{}: file {} missing from archive",
                    spec, relative
                )));
            }
            hash::verify_file(&source, expected)?;

            let dest = filesystem::safe_join(&self.env.root, relative)?;
            if self.is_reserved(&dest) {
                return Err(Error::FileConflict {
                    path: dest,
                    owner: "googet".to_string(),
                });
            }
            if let Some(owner) = self.db.file_owner(&dest)? {
                if owner != key {
                    return Err(Error::FileConflict {
                        path: dest,
                        owner: owner.to_string(),
                    });
                }
            }

            staged.push(StagedFile {
                source,
                dest,
                checksum: expected.to_ascii_lowercase(),
            });
        }
        Ok(staged)
    }

    /// Paths under the root that belong to the manager itself
    fn is_reserved(&self, dest: &Path) -> bool {
        if dest.starts_with(&self.env.cache_dir) || dest.starts_with(&self.env.repo_dir) {
            return true;
        }
        let dest = dest.to_string_lossy();
        [
            &self.env.db_path,
            &self.env.lock_path,
            &self.env.root.join(CONFIG_FILE),
        ]
        .iter()
        .any(|p| dest.starts_with(p.to_string_lossy().as_ref()))
    }

    fn fetch(&self, spec: &PkgSpec, url: &Url) -> Result<Fetched> {
        let ident = spec.ident();
        if let Some(path) = self.cache.lookup(&ident, &spec.checksum) {
            return Ok(Fetched {
                path,
                downloaded: false,
            });
        }
        let path = self
            .client
            .download(url, &ident, &spec.checksum, &self.cache, &self.env.cancel)?;
        Ok(Fetched {
            path,
            downloaded: true,
        })
    }

    /// The archive an installed package came from
    ///
    /// Prefers the recorded cache path, then the cache slot for the ident,
    /// then a fresh download from the recorded URL.
    fn archive_for(&self, state: &PackageState) -> Result<Fetched> {
        if let Some(path) = state
            .local_path
            .as_deref()
            .and_then(|p| self.cache.verify_at(p, &state.checksum))
        {
            return Ok(Fetched {
                path,
                downloaded: false,
            });
        }

        if state.download_url.is_empty() {
            return Err(Error::NotFoundError(format!(
                "no archive or download URL recorded for {}",
                state.spec
            )));
        }
        let url = Url::parse(&state.download_url).map_err(|e| {
            Error::ParseError(format!("{}: bad URL {}: {}", state.spec, state.download_url, e))
        })?;

        let mut spec = state.spec.clone();
        spec.checksum = state.checksum.clone();
        self.fetch(&spec, &url)
    }

    fn unpack(&self, spec: &PkgSpec, archive_path: &Path) -> Result<PathBuf> {
        let work_dir = self.cache.work_dir(&spec.ident());
        if work_dir.exists() {
            fs::remove_dir_all(&work_dir)?;
        }
        archive::unpack(archive_path, &work_dir)?;
        Ok(work_dir)
    }

    fn discard_work_dir(&self, work_dir: &Path) {
        if let Err(e) = fs::remove_dir_all(work_dir) {
            warn!("Failed to remove {}: {}", work_dir.display(), e);
        }
    }

    fn delete_files<'p>(&self, paths: impl Iterator<Item = &'p PathBuf>) {
        for path in paths {
            match filesystem::remove_file_if_exists(path) {
                Ok(true) => debug!("Deleted {}", path.display()),
                Ok(false) => debug!("{} already gone", path.display()),
                Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
            }
            filesystem::remove_empty_parents(path, &self.env.root);
        }
    }
}
