// src/manager.rs

//! Verb-level operations
//!
//! [`Manager`] owns the [`Environment`] and the repository index and wires
//! the resolver, installer and cache together for each verb. Every verb
//! that touches installed state holds the database (and with it the
//! installation lock) for its whole duration.

use crate::cache::DownloadCache;
use crate::clean::{self, CleanMode, CleanReport};
use crate::config::Environment;
use crate::db::Database;
use crate::db::models::PackageState;
use crate::error::{Error, Result};
use crate::packages::{PackageKey, PackageRequest, PkgSpec};
use crate::repository::{RepoIndex, RepoMap, RepositoryClient};
use crate::resolver::plan::{match_installed, summarize};
use crate::resolver::{Plan, Resolver, Update, compute_updates};
use crate::transaction::{ExecutionReport, Installer, VerifyReport};
use tracing::{debug, info};

pub struct Manager {
    env: Environment,
    index: RepoIndex,
}

impl Manager {
    /// Manager over the `.repo` files of `env`
    pub fn new(env: Environment) -> Result<Self> {
        let client = RepositoryClient::new(&env)?;
        let index = RepoIndex::new(client, env.repo_dir.clone());
        Ok(Self { env, index })
    }

    pub fn with_index(env: Environment, index: RepoIndex) -> Self {
        Self { env, index }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn index(&self) -> &RepoIndex {
        &self.index
    }

    fn open_db(&self) -> Result<Database> {
        self.env.ensure_dirs()?;
        Database::open_env(&self.env)
    }

    /// Install each request in turn, one plan per request
    pub fn install(&self, requests: &[PackageRequest], reinstall: bool) -> Result<ExecutionReport> {
        let mut db = self.open_db()?;
        let no_repos = RepoMap::new();
        let repos = if reinstall {
            &no_repos
        } else {
            self.index.repos()?
        };

        let mut report = ExecutionReport::default();
        for request in requests {
            let installed = installed_specs(&db)?;
            let plan = Resolver::new(&installed, repos, &self.env.archs)
                .plan_install(request, reinstall)?;
            log_plan(&request.to_string(), &plan);
            report.extend(self.run_plan(&mut db, &plan, false)?);
        }

        db.close()?;
        Ok(report)
    }

    /// Remove the requested packages and everything depending on them
    pub fn remove(&self, requests: &[PackageRequest], dbonly: bool) -> Result<ExecutionReport> {
        let mut db = self.open_db()?;
        let installed = installed_specs(&db)?;

        let keys = requests
            .iter()
            .map(|request| {
                match_installed(&installed, request, &self.env.archs)
                    .map(PkgSpec::key)
                    .ok_or_else(|| Error::NotFoundError(format!("{} is not installed", request)))
            })
            .collect::<Result<Vec<PackageKey>>>()?;

        let no_repos = RepoMap::new();
        let plan = Resolver::new(&installed, &no_repos, &self.env.archs).plan_remove(&keys)?;
        log_plan("remove", &plan);
        let report = self.run_plan(&mut db, &plan, dbonly)?;

        db.close()?;
        Ok(report)
    }

    /// Move every installed package to its winning repository version
    pub fn update(&self) -> Result<ExecutionReport> {
        let mut db = self.open_db()?;
        let installed = installed_specs(&db)?;
        let plan = Resolver::new(&installed, self.index.repos()?, &self.env.archs).plan_update()?;
        log_plan("update", &plan);
        let report = self.run_plan(&mut db, &plan, false)?;

        db.close()?;
        Ok(report)
    }

    /// Report what `update` would change
    pub fn check(&self) -> Result<Vec<Update>> {
        let db = self.open_db()?;
        let updates = compute_updates(&db.package_map()?, self.index.repos()?)?;
        db.close()?;
        Ok(updates)
    }

    pub fn clean(&self, mode: &CleanMode) -> Result<CleanReport> {
        let db = self.open_db()?;
        let installed = db.fetch_all(None)?;
        let report = clean::clean(&DownloadCache::new(&self.env.cache_dir), &installed, mode)?;
        db.close()?;
        Ok(report)
    }

    /// Installed records whose name contains `filter`
    pub fn installed(&self, filter: Option<&str>) -> Result<Vec<PackageState>> {
        let db = self.open_db()?;
        let states = db.fetch_all(filter)?;
        db.close()?;
        Ok(states)
    }

    /// Verify the requested packages, or every installed package
    pub fn verify(&self, requests: &[PackageRequest]) -> Result<Vec<VerifyReport>> {
        let mut db = self.open_db()?;
        let installed = installed_specs(&db)?;

        let keys: Vec<PackageKey> = if requests.is_empty() {
            installed.iter().map(PkgSpec::key).collect()
        } else {
            requests
                .iter()
                .map(|request| {
                    match_installed(&installed, request, &self.env.archs)
                        .map(PkgSpec::key)
                        .ok_or_else(|| {
                            Error::NotFoundError(format!("{} is not installed", request))
                        })
                })
                .collect::<Result<_>>()?
        };

        let installer = Installer::new(&self.env, &mut db, self.index.client());
        let reports = keys
            .iter()
            .map(|key| installer.verify(key))
            .collect::<Result<Vec<_>>>()?;

        db.close()?;
        Ok(reports)
    }

    fn run_plan(&self, db: &mut Database, plan: &Plan, dbonly: bool) -> Result<ExecutionReport> {
        if plan.is_empty() {
            return Ok(ExecutionReport::default());
        }
        Installer::new(&self.env, db, self.index.client()).execute(plan, dbonly)
    }
}

fn installed_specs(db: &Database) -> Result<Vec<PkgSpec>> {
    Ok(db.fetch_all(None)?.into_iter().map(|s| s.spec).collect())
}

fn log_plan(label: &str, plan: &Plan) {
    if plan.is_empty() {
        debug!("Nothing to do for {}", label);
        return;
    }
    for (action, items) in summarize(plan) {
        info!("{}: {} {}", label, action, items.join(", "));
    }
}
