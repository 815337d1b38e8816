// src/resolver/plan.rs

//! Resolution plans
//!
//! A [`Plan`] is everything one operation will do, decided before any side
//! effect: installed packages to remove (dependents first), repository
//! packages to install (dependencies first) and installed packages to
//! reinstall from their recorded archive.

use crate::db::models::PackageMap;
use crate::error::{Error, Result};
use crate::packages::{Arch, PackageIdent, PackageKey, PackageRequest, PkgSpec};
use crate::repository::RepoMap;
use crate::resolver::graph::{self, ResolvedPackage};
use crate::resolver::selector;
use crate::resolver::update;
use crate::version::Version;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// A repository package to install, with the version it supersedes
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedInstall {
    pub package: ResolvedPackage,
    pub previous: Option<Version>,
}

impl PlannedInstall {
    pub fn spec(&self) -> &PkgSpec {
        &self.package.spec
    }
}

/// Ordered operations for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Installed packages to remove, dependents first
    pub removals: Vec<PackageKey>,
    /// Packages to install, dependencies first
    pub installs: Vec<PlannedInstall>,
    /// Installed packages to reinstall from their recorded source
    pub reinstalls: Vec<PackageKey>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.installs.is_empty() && self.reinstalls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.removals.len() + self.installs.len() + self.reinstalls.len()
    }
}

/// Find the installed package a request refers to
///
/// Without an arch, the match whose arch ranks earliest in `archs` wins.
pub fn match_installed<'a>(
    installed: &'a [PkgSpec],
    request: &PackageRequest,
    archs: &[Arch],
) -> Option<&'a PkgSpec> {
    let rank = |arch: Arch| archs.iter().position(|a| *a == arch).unwrap_or(archs.len());
    installed
        .iter()
        .filter(|s| s.name == request.name)
        .filter(|s| request.arch.is_none_or(|a| a == s.arch))
        .filter(|s| request.version.as_ref().is_none_or(|v| *v == s.version))
        .min_by_key(|s| rank(s.arch))
}

/// Plans operations against one snapshot of installed state and repos
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    installed: &'a [PkgSpec],
    repos: &'a RepoMap,
    archs: &'a [Arch],
}

impl<'a> Resolver<'a> {
    pub fn new(installed: &'a [PkgSpec], repos: &'a RepoMap, archs: &'a [Arch]) -> Self {
        Self {
            installed,
            repos,
            archs,
        }
    }

    fn installed_idents(&self) -> Vec<PackageIdent> {
        self.installed.iter().map(|s| s.ident()).collect()
    }

    fn installed_map(&self) -> PackageMap {
        self.installed
            .iter()
            .map(|s| (s.key(), s.version.clone()))
            .collect()
    }

    /// Plan `install <request>`
    ///
    /// With `reinstall`, an installed match is reinstalled from its recorded
    /// source and a missing one is skipped. Otherwise a target already
    /// installed at the winning version yields an empty plan without
    /// looking at its dependencies.
    pub fn plan_install(&self, request: &PackageRequest, reinstall: bool) -> Result<Plan> {
        if reinstall {
            return Ok(match match_installed(self.installed, request, self.archs) {
                Some(spec) => {
                    debug!("Planning reinstall of {}", spec);
                    Plan {
                        reinstalls: vec![spec.key()],
                        ..Plan::default()
                    }
                }
                None => {
                    warn!("{} is not installed, nothing to reinstall", request);
                    Plan::default()
                }
            });
        }

        let candidate = selector::select_request(request, self.archs, self.repos)?;
        let installed_version = self.installed_map().get(&candidate.spec.key()).cloned();
        if installed_version.as_ref() == Some(&candidate.spec.version) {
            info!("{} is already installed", candidate.spec);
            return Ok(Plan::default());
        }

        let target = ResolvedPackage::from_candidate(candidate)?;
        let closure = graph::install_closure(target, &self.installed_idents(), self.repos)?;
        self.finish(closure)
    }

    /// Plan `update`: every installed package whose winning version differs
    pub fn plan_update(&self) -> Result<Plan> {
        let updates = update::compute_updates(&self.installed_map(), self.repos)?;
        let installed = self.installed_idents();

        let mut merged: Vec<ResolvedPackage> = Vec::new();
        for update in updates {
            for package in graph::install_closure(update.target, &installed, self.repos)? {
                if !merged.iter().any(|m| m.spec.key() == package.spec.key()) {
                    merged.push(package);
                }
            }
        }
        self.finish(merged)
    }

    /// Plan `remove`: the named packages plus every installed package that
    /// would be left with a broken dependency
    pub fn plan_remove(&self, keys: &[PackageKey]) -> Result<Plan> {
        let installed_keys: BTreeSet<PackageKey> =
            self.installed.iter().map(|s| s.key()).collect();
        for key in keys {
            if !installed_keys.contains(key) {
                return Err(Error::NotFoundError(format!("{} is not installed", key)));
            }
        }

        let requested: BTreeSet<PackageKey> = keys.iter().cloned().collect();
        let mut removal = requested.clone();
        for dependent in graph::broken_dependents(self.installed, &requested, &[]) {
            info!("{} depends on a package being removed and will be removed too", dependent);
            removal.insert(dependent);
        }

        Ok(Plan {
            removals: graph::removal_order(self.installed, &removal)?,
            ..Plan::default()
        })
    }

    /// Apply replacement, cascade and conflict rules to an install closure
    fn finish(&self, closure: Vec<ResolvedPackage>) -> Result<Plan> {
        if closure.is_empty() {
            return Ok(Plan::default());
        }

        let closure_keys: BTreeSet<PackageKey> =
            closure.iter().map(|p| p.spec.key()).collect();
        let incoming: Vec<PackageIdent> = closure.iter().map(|p| p.spec.ident()).collect();

        self.check_closure_replaces(&closure)?;

        // Installed packages replaced by a closure member
        let mut replaced = BTreeSet::new();
        for member in &closure {
            for spec in self.installed {
                if closure_keys.contains(&spec.key()) {
                    continue;
                }
                let ident = spec.ident();
                if !member.spec.replaces_ident(&ident) {
                    continue;
                }
                if spec.replaces_ident(&member.spec.ident()) {
                    return Err(Error::ReplacementCycle(format!(
                        "{} and {} replace each other",
                        member.spec, ident
                    )));
                }
                info!("{} replaces installed {}", member.spec, ident);
                replaced.insert(spec.key());
            }
        }

        let mut removal = replaced.clone();
        for dependent in graph::broken_dependents(self.installed, &replaced, &incoming) {
            if closure_keys.contains(&dependent) {
                continue;
            }
            info!("{} depends on a replaced package and will be removed", dependent);
            removal.insert(dependent);
        }

        self.check_conflicts(&closure, &closure_keys, &removal)?;
        self.check_dependencies_survive(&closure, &closure_keys, &removal)?;

        let installed_map = self.installed_map();
        let installs = closure
            .into_iter()
            .map(|package| PlannedInstall {
                previous: installed_map.get(&package.spec.key()).cloned(),
                package,
            })
            .collect();

        Ok(Plan {
            removals: graph::removal_order(self.installed, &removal)?,
            installs,
            reinstalls: Vec::new(),
        })
    }

    /// Every closure member must still be satisfied once `removal` is gone
    ///
    /// The closure accepts installed packages as they stand, so a package
    /// the same plan replaces (or cascades away) cannot count.
    fn check_dependencies_survive(
        &self,
        closure: &[ResolvedPackage],
        closure_keys: &BTreeSet<PackageKey>,
        removal: &BTreeSet<PackageKey>,
    ) -> Result<()> {
        let available: Vec<PackageIdent> = self
            .installed
            .iter()
            .filter(|s| !removal.contains(&s.key()) && !closure_keys.contains(&s.key()))
            .map(|s| s.ident())
            .chain(closure.iter().map(|p| p.spec.ident()))
            .collect();

        for member in closure {
            for request in member.spec.dependency_requests() {
                if !graph::is_satisfied(&request, available.iter()) {
                    return Err(Error::UnsatisfiableDependency(format!(
                        "{} requires {}, which this operation removes",
                        member.spec, request
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_closure_replaces(&self, closure: &[ResolvedPackage]) -> Result<()> {
        for (i, a) in closure.iter().enumerate() {
            for b in &closure[i + 1..] {
                let a_replaces_b = a.spec.replaces_ident(&b.spec.ident());
                let b_replaces_a = b.spec.replaces_ident(&a.spec.ident());
                if a_replaces_b && b_replaces_a {
                    return Err(Error::ReplacementCycle(format!(
                        "{} and {} replace each other",
                        a.spec, b.spec
                    )));
                }
                if a_replaces_b || b_replaces_a {
                    return Err(Error::ConflictError(format!(
                        "{} and {} are both required but one replaces the other",
                        a.spec, b.spec
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_conflicts(
        &self,
        closure: &[ResolvedPackage],
        closure_keys: &BTreeSet<PackageKey>,
        removal: &BTreeSet<PackageKey>,
    ) -> Result<()> {
        let staying: Vec<&PkgSpec> = self
            .installed
            .iter()
            .filter(|s| !removal.contains(&s.key()) && !closure_keys.contains(&s.key()))
            .collect();

        for member in closure {
            let ident = member.spec.ident();
            for spec in &staying {
                if member.spec.conflicts_with(&spec.ident()) || spec.conflicts_with(&ident) {
                    return Err(Error::ConflictError(format!(
                        "{} conflicts with installed {}",
                        member.spec, spec
                    )));
                }
            }
            for other in closure {
                if other.spec.key() != member.spec.key() && member.spec.conflicts_with(&other.spec.ident())
                {
                    return Err(Error::ConflictError(format!(
                        "{} conflicts with {}",
                        member.spec, other.spec
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Keys in `plan` grouped for display: what is removed, installed, upgraded
pub fn summarize(plan: &Plan) -> BTreeMap<&'static str, Vec<String>> {
    let mut summary: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for key in &plan.removals {
        summary.entry("remove").or_default().push(key.to_string());
    }
    for install in &plan.installs {
        let label = match &install.previous {
            None => "install",
            Some(prev) if *prev < install.spec().version => "upgrade",
            Some(_) => "downgrade",
        };
        summary
            .entry(label)
            .or_default()
            .push(install.spec().to_string());
    }
    for key in &plan.reinstalls {
        summary.entry("reinstall").or_default().push(key.to_string());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::IdentPattern;
    use crate::repository::{PRIORITY_DEFAULT, Repo};

    fn spec(name: &str, version: &str) -> PkgSpec {
        PkgSpec::new(name, Arch::Noarch, Version::parse(version).unwrap())
    }

    fn with_deps(mut s: PkgSpec, deps: &[(&str, &str)]) -> PkgSpec {
        for (d, min) in deps {
            s.dependencies
                .insert(d.to_string(), Version::parse(min).unwrap());
        }
        s
    }

    fn replacing(mut s: PkgSpec, patterns: &[&str]) -> PkgSpec {
        s.replaces = patterns.iter().map(|p| IdentPattern::parse(p).unwrap()).collect();
        s
    }

    fn repo(specs: Vec<PkgSpec>) -> RepoMap {
        let url = "https://repo/";
        [(url.to_string(), Repo::new(url, PRIORITY_DEFAULT, specs))]
            .into_iter()
            .collect()
    }

    fn req(s: &str) -> PackageRequest {
        PackageRequest::parse(s).unwrap()
    }

    fn key(name: &str) -> PackageKey {
        PackageKey::new(name, Arch::Noarch)
    }

    fn install_names(plan: &Plan) -> Vec<String> {
        plan.installs.iter().map(|i| i.spec().to_string()).collect()
    }

    const ARCHS: &[Arch] = &[Arch::X86_64, Arch::Noarch];

    #[test]
    fn test_single_install() {
        let installed = vec![spec("C", "3")];
        let repos = repo(vec![spec("A", "1")]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("A"), false)
            .unwrap();
        assert_eq!(install_names(&plan), vec!["A.noarch.1"]);
        assert!(plan.removals.is_empty());
        assert_eq!(plan.installs[0].previous, None);
    }

    #[test]
    fn test_already_installed_is_empty_plan() {
        // Missing dependency is not re-examined
        let installed = vec![with_deps(spec("A", "1"), &[("gone", "1")])];
        let repos = repo(vec![with_deps(spec("A", "1"), &[("gone", "1")])]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("A"), false)
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_reinstall_only_when_installed() {
        let installed = vec![spec("A", "1")];
        let repos = repo(vec![spec("A", "1"), spec("B", "1")]);
        let resolver = Resolver::new(&installed, &repos, ARCHS);

        let plan = resolver.plan_install(&req("A"), true).unwrap();
        assert_eq!(plan.reinstalls, vec![key("A")]);
        assert!(plan.installs.is_empty());

        assert!(resolver.plan_install(&req("B"), true).unwrap().is_empty());
    }

    #[test]
    fn test_upgrade_records_previous_version() {
        let installed = vec![spec("A", "1")];
        let repos = repo(vec![spec("A", "2")]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("A"), false)
            .unwrap();
        assert_eq!(plan.installs[0].previous, Some(Version::parse("1").unwrap()));
        assert_eq!(summarize(&plan)["upgrade"], vec!["A.noarch.2"]);
    }

    #[test]
    fn test_dependency_already_satisfied() {
        let installed = vec![spec("B", "2"), spec("C", "3")];
        let repos = repo(vec![with_deps(spec("A", "1"), &[("B", "2")]), spec("B", "2")]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("A"), false)
            .unwrap();
        assert_eq!(install_names(&plan), vec!["A.noarch.1"]);
    }

    #[test]
    fn test_replace_with_version_floor() {
        let installed = vec![spec("A", "5")];
        let repos = repo(vec![replacing(spec("B", "2"), &["A.*.3+"])]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("B"), false)
            .unwrap();
        assert_eq!(plan.removals, vec![key("A")]);
        assert_eq!(install_names(&plan), vec!["B.noarch.2"]);
    }

    #[test]
    fn test_replace_floor_not_met_keeps_package() {
        let installed = vec![spec("A", "2")];
        let repos = repo(vec![replacing(spec("B", "2"), &["A.*.3+"])]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("B"), false)
            .unwrap();
        assert!(plan.removals.is_empty());
    }

    #[test]
    fn test_replace_cascades_to_dependents_first() {
        let installed = vec![spec("A", "5"), with_deps(spec("C", "3"), &[("A", "5")])];
        let repos = repo(vec![replacing(spec("B", "2"), &["A"])]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("B"), false)
            .unwrap();
        assert_eq!(plan.removals, vec![key("C"), key("A")]);
        assert_eq!(install_names(&plan), vec!["B.noarch.2"]);
    }

    #[test]
    fn test_replacing_own_dependency_is_unsatisfiable() {
        let installed = vec![spec("A", "5")];
        let repos = repo(vec![with_deps(replacing(spec("B", "1"), &["A"]), &[("A", "1")])]);
        assert!(matches!(
            Resolver::new(&installed, &repos, ARCHS).plan_install(&req("B"), false),
            Err(Error::UnsatisfiableDependency(_))
        ));
    }

    #[test]
    fn test_update_cannot_replace_what_it_depends_on() {
        let installed = vec![spec("A", "5"), spec("B", "1")];
        let repos = repo(vec![
            spec("A", "5"),
            with_deps(replacing(spec("B", "2"), &["A"]), &[("A", "5")]),
        ]);
        assert!(matches!(
            Resolver::new(&installed, &repos, ARCHS).plan_update(),
            Err(Error::UnsatisfiableDependency(_))
        ));
    }

    #[test]
    fn test_mutual_replacement_is_a_cycle() {
        let installed = vec![replacing(spec("A", "1"), &["B"])];
        let repos = repo(vec![replacing(spec("B", "2"), &["A"])]);
        assert!(matches!(
            Resolver::new(&installed, &repos, ARCHS).plan_install(&req("B"), false),
            Err(Error::ReplacementCycle(_))
        ));
    }

    #[test]
    fn test_replace_same_key_is_an_upgrade_not_a_removal() {
        let installed = vec![spec("A", "1")];
        let repos = repo(vec![replacing(spec("A", "2"), &["A"])]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("A"), false)
            .unwrap();
        assert!(plan.removals.is_empty());
        assert_eq!(install_names(&plan), vec!["A.noarch.2"]);
    }

    #[test]
    fn test_conflict_with_installed() {
        let installed = vec![spec("old", "1")];
        let mut new = spec("new", "1");
        new.conflicts = vec![IdentPattern::parse("old").unwrap()];
        let repos = repo(vec![new]);
        assert!(matches!(
            Resolver::new(&installed, &repos, ARCHS).plan_install(&req("new"), false),
            Err(Error::ConflictError(_))
        ));
    }

    #[test]
    fn test_conflict_with_replaced_package_is_allowed() {
        let installed = vec![spec("old", "1")];
        let mut new = replacing(spec("new", "1"), &["old"]);
        new.conflicts = vec![IdentPattern::parse("old").unwrap()];
        let repos = repo(vec![new]);
        let plan = Resolver::new(&installed, &repos, ARCHS)
            .plan_install(&req("new"), false)
            .unwrap();
        assert_eq!(plan.removals, vec![key("old")]);
    }

    #[test]
    fn test_remove_cascade() {
        let installed = vec![
            spec("base", "1"),
            with_deps(spec("mid", "1"), &[("base", "1")]),
            with_deps(spec("top", "1"), &[("mid", "1")]),
            spec("other", "1"),
        ];
        let repos = RepoMap::new();
        let resolver = Resolver::new(&installed, &repos, ARCHS);

        let plan = resolver.plan_remove(&[key("base")]).unwrap();
        assert_eq!(plan.removals, vec![key("top"), key("mid"), key("base")]);

        assert!(matches!(
            resolver.plan_remove(&[key("absent")]),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_update_plan_merges_closures() {
        let installed = vec![spec("a", "1"), spec("b", "1")];
        let repos = repo(vec![
            with_deps(spec("a", "2"), &[("lib", "1")]),
            with_deps(spec("b", "2"), &[("lib", "1")]),
            spec("lib", "1"),
        ]);
        let plan = Resolver::new(&installed, &repos, ARCHS).plan_update().unwrap();
        assert_eq!(
            install_names(&plan),
            vec!["lib.noarch.1", "a.noarch.2", "b.noarch.2"]
        );
    }

    #[test]
    fn test_match_installed_prefers_arch_order() {
        let installed = vec![
            PkgSpec::new("foo", Arch::Noarch, Version::parse("1").unwrap()),
            PkgSpec::new("foo", Arch::X86_64, Version::parse("1").unwrap()),
        ];
        assert_eq!(
            match_installed(&installed, &req("foo"), ARCHS).unwrap().arch,
            Arch::X86_64
        );
        assert_eq!(
            match_installed(&installed, &req("foo.noarch"), ARCHS).unwrap().arch,
            Arch::Noarch
        );
        assert!(match_installed(&installed, &req("foo.noarch.2"), ARCHS).is_none());
    }
}
