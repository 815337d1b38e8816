// src/resolver/graph.rs

//! Dependency graph data structures and algorithms
//!
//! Provides the install closure of a target package, topological ordering
//! with cycle detection, and reverse-dependency queries over the installed
//! set.

use crate::error::{Error, Result};
use crate::packages::{DependencyRequest, PackageIdent, PackageKey, PkgSpec};
use crate::repository::RepoMap;
use crate::resolver::selector::{self, Candidate};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;
use url::Url;

/// A package the closure pulls from a repository
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPackage {
    pub spec: PkgSpec,
    pub repo_url: String,
    pub download_url: Url,
}

impl ResolvedPackage {
    pub fn from_candidate(candidate: Candidate<'_>) -> Result<Self> {
        Ok(Self {
            spec: candidate.spec.clone(),
            repo_url: candidate.repo.url.clone(),
            download_url: candidate.download_url()?,
        })
    }
}

/// Directed graph keyed by `name.arch`; an edge points from a package to
/// one of its dependencies
#[derive(Debug)]
pub struct DependencyGraph<T> {
    nodes: BTreeMap<PackageKey, T>,
    edges: BTreeMap<PackageKey, BTreeSet<PackageKey>>,
}

impl<T> DependencyGraph<T> {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self, key: PackageKey, value: T) {
        self.nodes.insert(key, value);
    }

    pub fn add_edge(&mut self, from: PackageKey, to: PackageKey) {
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn contains(&self, key: &PackageKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(&self, key: &PackageKey) -> Option<&T> {
        self.nodes.get(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Order nodes so every dependency precedes its dependents
    ///
    /// Edges to keys that are not nodes are ignored. A cycle fails with
    /// [`Error::DependencyCycle`] naming the packages on it.
    pub fn topological_sort(&self) -> Result<Vec<PackageKey>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: BTreeMap<&PackageKey, Mark> = BTreeMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for root in self.nodes.keys() {
            if marks.contains_key(root) {
                continue;
            }
            // Iterative DFS; the stack holds the current path
            let mut stack: Vec<(&PackageKey, Vec<&PackageKey>)> =
                vec![(root, self.children(root))];
            marks.insert(root, Mark::Visiting);

            while let Some((node, children)) = stack.last_mut() {
                match children.pop() {
                    Some(child) => match marks.get(child).copied() {
                        Some(Mark::Done) => {}
                        Some(Mark::Visiting) => {
                            let start = stack.iter().position(|(k, _)| *k == child).unwrap_or(0);
                            let cycle: Vec<String> = stack[start..]
                                .iter()
                                .map(|(k, _)| k.to_string())
                                .chain(std::iter::once(child.to_string()))
                                .collect();
                            return Err(Error::DependencyCycle(cycle.join(" -> ")));
                        }
                        None => {
                            marks.insert(child, Mark::Visiting);
                            let grandchildren = self.children(child);
                            stack.push((child, grandchildren));
                        }
                    },
                    None => {
                        let node = *node;
                        marks.insert(node, Mark::Done);
                        order.push(node.clone());
                        stack.pop();
                    }
                }
            }
        }

        Ok(order)
    }

    /// Dependencies of `key` that are nodes, in reverse key order so that
    /// popping visits them ascending
    fn children(&self, key: &PackageKey) -> Vec<&PackageKey> {
        self.edges
            .get(key)
            .map(|deps| deps.iter().rev().filter(|d| self.nodes.contains_key(*d)).collect())
            .unwrap_or_default()
    }
}

/// Whether any of `available` satisfies `request`
pub fn is_satisfied<'a>(
    request: &DependencyRequest,
    mut available: impl Iterator<Item = &'a PackageIdent>,
) -> bool {
    available.any(|ident| request.is_satisfied_by(ident))
}

/// Compute the install closure of `target`, dependencies first
///
/// A dependency already satisfied by an installed package is accepted as is.
/// Otherwise the best repository candidate is pulled in, and it must meet
/// the minimum version or the closure fails with
/// [`Error::UnsatisfiableDependency`].
pub fn install_closure(
    target: ResolvedPackage,
    installed: &[PackageIdent],
    repos: &RepoMap,
) -> Result<Vec<ResolvedPackage>> {
    let mut graph: DependencyGraph<ResolvedPackage> = DependencyGraph::new();
    let mut worklist = VecDeque::new();

    let target_key = target.spec.key();
    worklist.push_back(target_key.clone());
    graph.add_node(target_key, target);

    while let Some(key) = worklist.pop_front() {
        let Some(node) = graph.get(&key) else {
            continue;
        };
        let parent = node.spec.ident();
        let requests = node.spec.dependency_requests();

        for request in requests {
            if is_satisfied(&request, installed.iter()) {
                debug!("{}: {} satisfied by installed package", parent, request);
                continue;
            }

            // Another closure member may already provide it
            let pending = graph
                .nodes
                .iter()
                .find(|(_, n)| request.is_satisfied_by(&n.spec.ident()))
                .map(|(k, _)| k.clone());
            if let Some(dep_key) = pending {
                graph.add_edge(key.clone(), dep_key);
                continue;
            }

            let candidate = selector::select_latest(&request.name, request.arch, repos)
                .map_err(|e| {
                    Error::UnsatisfiableDependency(format!(
                        "{} requires {}: {}",
                        parent, request, e
                    ))
                })?;
            if candidate.spec.version < request.min_version {
                return Err(Error::UnsatisfiableDependency(format!(
                    "{} requires {}, best available is {}",
                    parent, request, candidate.spec
                )));
            }

            let dep_key = candidate.spec.key();
            if graph.contains(&dep_key) {
                // Same name.arch already pending at a version below the floor
                return Err(Error::UnsatisfiableDependency(format!(
                    "{} requires {}, but {} is already selected",
                    parent,
                    request,
                    graph
                        .get(&dep_key)
                        .map(|n| n.spec.to_string())
                        .unwrap_or_default()
                )));
            }

            debug!("{}: pulling {} for {}", parent, candidate.spec, request);
            graph.add_edge(key.clone(), dep_key.clone());
            graph.add_node(dep_key.clone(), ResolvedPackage::from_candidate(candidate)?);
            worklist.push_back(dep_key);
        }
    }

    let order = graph.topological_sort()?;
    Ok(order
        .into_iter()
        .filter_map(|key| graph.nodes.remove(&key))
        .collect())
}

/// Graph of installed packages, used for remove cascades and ordering
pub fn installed_graph(installed: &[PkgSpec]) -> DependencyGraph<PkgSpec> {
    let mut graph = DependencyGraph::new();
    for spec in installed {
        graph.add_node(spec.key(), spec.clone());
    }
    for spec in installed {
        for request in spec.dependency_requests() {
            for dep in installed {
                if dep.key() != spec.key() && request.is_satisfied_by(&dep.ident()) {
                    graph.add_edge(spec.key(), dep.key());
                }
            }
        }
    }
    graph
}

/// Installed packages that lose a satisfied dependency once `removed` is
/// gone, computed to a fixpoint
///
/// `incoming` lists packages the same operation installs; a dependency they
/// satisfy does not trigger removal.
pub fn broken_dependents(
    installed: &[PkgSpec],
    removed: &BTreeSet<PackageKey>,
    incoming: &[PackageIdent],
) -> BTreeSet<PackageKey> {
    let mut gone = removed.clone();
    loop {
        let remaining: Vec<PackageIdent> = installed
            .iter()
            .filter(|s| !gone.contains(&s.key()))
            .map(|s| s.ident())
            .chain(incoming.iter().cloned())
            .collect();
        let lost: Vec<PackageIdent> = installed
            .iter()
            .filter(|s| gone.contains(&s.key()))
            .map(|s| s.ident())
            .collect();

        let newly: Vec<PackageKey> = installed
            .iter()
            .filter(|s| !gone.contains(&s.key()))
            .filter(|s| {
                s.dependency_requests().iter().any(|request| {
                    is_satisfied(request, lost.iter()) && !is_satisfied(request, remaining.iter())
                })
            })
            .map(|s| s.key())
            .collect();

        if newly.is_empty() {
            break;
        }
        for key in newly {
            debug!("{} depends on a package being removed", key);
            gone.insert(key);
        }
    }

    gone.difference(removed).cloned().collect()
}

/// Order `keys` for removal: dependents before the packages they depend on
pub fn removal_order(installed: &[PkgSpec], keys: &BTreeSet<PackageKey>) -> Result<Vec<PackageKey>> {
    let subset: Vec<PkgSpec> = installed
        .iter()
        .filter(|s| keys.contains(&s.key()))
        .cloned()
        .collect();
    let mut order = installed_graph(&subset).topological_sort()?;
    order.reverse();
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::Arch;
    use crate::repository::{PRIORITY_DEFAULT, Repo};
    use crate::version::Version;

    fn spec(name: &str, version: &str, deps: &[(&str, &str)]) -> PkgSpec {
        let mut s = PkgSpec::new(name, Arch::Noarch, Version::parse(version).unwrap());
        for (dep, min) in deps {
            s.dependencies
                .insert(dep.to_string(), Version::parse(min).unwrap());
        }
        s
    }

    fn repo_map(specs: Vec<PkgSpec>) -> RepoMap {
        let url = "https://repo/";
        [(url.to_string(), Repo::new(url, PRIORITY_DEFAULT, specs))]
            .into_iter()
            .collect()
    }

    fn target(repos: &RepoMap, name: &str) -> ResolvedPackage {
        ResolvedPackage::from_candidate(selector::select_latest(name, Arch::Noarch, repos).unwrap())
            .unwrap()
    }

    fn names(closure: &[ResolvedPackage]) -> Vec<String> {
        closure.iter().map(|p| p.spec.to_string()).collect()
    }

    fn key(name: &str) -> PackageKey {
        PackageKey::new(name, Arch::Noarch)
    }

    #[test]
    fn test_closure_orders_dependencies_first() {
        let repos = repo_map(vec![
            spec("app", "1", &[("lib", "1"), ("util", "2")]),
            spec("lib", "1", &[("base", "1")]),
            spec("util", "2", &[("base", "1")]),
            spec("base", "1", &[]),
        ]);
        let closure = install_closure(target(&repos, "app"), &[], &repos).unwrap();
        let order = names(&closure);
        let pos = |n: &str| order.iter().position(|o| o.starts_with(n)).unwrap();

        assert_eq!(order.len(), 4);
        assert_eq!(order.last().unwrap(), "app.noarch.1");
        assert!(pos("base") < pos("lib"));
        assert!(pos("base") < pos("util"));
    }

    #[test]
    fn test_installed_dependency_is_not_pulled() {
        let repos = repo_map(vec![spec("a", "1", &[("b", "2")]), spec("b", "3", &[])]);
        let installed = vec![PackageIdent::parse("b.noarch.2").unwrap()];
        let closure = install_closure(target(&repos, "a"), &installed, &repos).unwrap();
        assert_eq!(names(&closure), vec!["a.noarch.1"]);
    }

    #[test]
    fn test_too_old_installed_dependency_is_upgraded() {
        let repos = repo_map(vec![spec("a", "1", &[("b", "2")]), spec("b", "3", &[])]);
        let installed = vec![PackageIdent::parse("b.noarch.1").unwrap()];
        let closure = install_closure(target(&repos, "a"), &installed, &repos).unwrap();
        assert_eq!(names(&closure), vec!["b.noarch.3", "a.noarch.1"]);
    }

    #[test]
    fn test_unsatisfiable_dependency() {
        let repos = repo_map(vec![spec("a", "1", &[("b", "5")]), spec("b", "3", &[])]);
        assert!(matches!(
            install_closure(target(&repos, "a"), &[], &repos),
            Err(Error::UnsatisfiableDependency(_))
        ));

        let missing = repo_map(vec![spec("a", "1", &[("nope", "1")])]);
        assert!(matches!(
            install_closure(target(&missing, "a"), &[], &missing),
            Err(Error::UnsatisfiableDependency(_))
        ));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let repos = repo_map(vec![
            spec("a", "1", &[("b", "1")]),
            spec("b", "1", &[("c", "1")]),
            spec("c", "1", &[("a", "1")]),
        ]);
        match install_closure(target(&repos, "a"), &[], &repos) {
            Err(Error::DependencyCycle(msg)) => assert!(msg.contains("a.noarch")),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_diamond_pulls_shared_dependency_once() {
        let repos = repo_map(vec![
            spec("top", "1", &[("left", "1"), ("right", "1")]),
            spec("left", "1", &[("shared", "1")]),
            spec("right", "1", &[("shared", "1")]),
            spec("shared", "1", &[]),
        ]);
        let closure = install_closure(target(&repos, "top"), &[], &repos).unwrap();
        assert_eq!(closure.len(), 4);
        assert_eq!(closure[0].spec.name, "shared");
    }

    #[test]
    fn test_broken_dependents_cascade() {
        let installed = vec![
            spec("a", "5", &[]),
            spec("c", "3", &[("a", "5")]),
            spec("d", "1", &[("c", "1")]),
            spec("e", "1", &[]),
        ];
        let removed: BTreeSet<_> = [key("a")].into_iter().collect();

        let broken = broken_dependents(&installed, &removed, &[]);
        assert_eq!(broken, [key("c"), key("d")].into_iter().collect());

        // A replacement that satisfies the dependency keeps dependents
        let incoming = vec![PackageIdent::parse("a.noarch.6").unwrap()];
        assert!(broken_dependents(&installed, &removed, &incoming).is_empty());
    }

    #[test]
    fn test_removal_order_puts_dependents_first() {
        let installed = vec![
            spec("a", "1", &[]),
            spec("b", "1", &[("a", "1")]),
            spec("c", "1", &[("b", "1")]),
        ];
        let keys: BTreeSet<_> = [key("a"), key("b"), key("c")].into_iter().collect();
        assert_eq!(
            removal_order(&installed, &keys).unwrap(),
            vec![key("c"), key("b"), key("a")]
        );
    }
}
