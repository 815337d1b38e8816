// src/resolver/selector.rs

//! Latest-version selection across repositories
//!
//! Candidates are ranked by repository priority first; only the highest
//! priority group that offers the package is considered at all, which is
//! what lets a rollback repository force a downgrade. Within that group the
//! greatest version wins. Remaining ties go to an exact arch match over
//! `noarch`, then the smallest repository URL, then manifest order.

use crate::error::{Error, Result};
use crate::packages::{Arch, PackageRequest, PkgSpec};
use crate::repository::{Repo, RepoMap};
use crate::version::Version;
use std::cmp::Reverse;
use tracing::debug;
use url::Url;

/// A spec together with the repository offering it
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub spec: &'a PkgSpec,
    pub repo: &'a Repo,
}

impl Candidate<'_> {
    /// Fetchable URL of the candidate's archive
    pub fn download_url(&self) -> Result<Url> {
        self.repo.archive_url(self.spec)
    }
}

/// Select the best `name.arch` (or `name.noarch`) across all repositories
pub fn select_latest<'a>(name: &str, arch: Arch, repos: &'a RepoMap) -> Result<Candidate<'a>> {
    select(name, arch, None, repos).ok_or_else(|| {
        Error::NoCandidate(format!("no repository offers {}.{}", name, arch))
    })
}

/// Like [`select_latest`], restricted to exactly `version`
pub fn select_version<'a>(
    name: &str,
    arch: Arch,
    version: &Version,
    repos: &'a RepoMap,
) -> Result<Candidate<'a>> {
    select(name, arch, Some(version), repos).ok_or_else(|| {
        Error::NoCandidate(format!(
            "no repository offers {}.{}.{}",
            name, arch, version
        ))
    })
}

/// Resolve a command-line request
///
/// Without an arch the configured archs are tried in preference order and
/// the first one that yields a candidate wins.
pub fn select_request<'a>(
    request: &PackageRequest,
    archs: &[Arch],
    repos: &'a RepoMap,
) -> Result<Candidate<'a>> {
    let pick = |arch: Arch| match &request.version {
        Some(v) => select_version(&request.name, arch, v, repos),
        None => select_latest(&request.name, arch, repos),
    };

    if let Some(arch) = request.arch {
        return pick(arch);
    }

    for &arch in archs {
        if let Ok(candidate) = pick(arch) {
            return Ok(candidate);
        }
    }
    Err(Error::NoCandidate(format!(
        "no repository offers {} for any of: {}",
        request,
        archs
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

fn select<'a>(
    name: &str,
    arch: Arch,
    version: Option<&Version>,
    repos: &'a RepoMap,
) -> Option<Candidate<'a>> {
    let mut best: Option<(Candidate<'a>, usize)> = None;

    for repo in repos.values() {
        for (position, spec) in repo.packages.iter().enumerate() {
            if spec.name != name || !spec.arch.is_compatible_with(arch) {
                continue;
            }
            if version.is_some_and(|v| spec.version != *v) {
                continue;
            }

            let candidate = Candidate { spec, repo };
            let better = match &best {
                None => true,
                Some((current, current_pos)) => {
                    rank(&candidate, position, arch) > rank(current, *current_pos, arch)
                }
            };
            if better {
                best = Some((candidate, position));
            }
        }
    }

    if let Some((c, _)) = &best {
        debug!(
            "Selected {} from {} (priority {})",
            c.spec, c.repo.url, c.repo.priority
        );
    }
    best.map(|(c, _)| c)
}

/// Ranking key; greater is better
fn rank<'a>(
    c: &Candidate<'a>,
    position: usize,
    wanted: Arch,
) -> (i32, &'a Version, bool, Reverse<&'a str>, Reverse<usize>) {
    (
        c.repo.priority,
        &c.spec.version,
        c.spec.arch == wanted,
        Reverse(c.repo.url.as_str()),
        Reverse(position),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{PRIORITY_CANARY, PRIORITY_DEFAULT, PRIORITY_ROLLBACK};

    fn spec(name: &str, arch: Arch, version: &str) -> PkgSpec {
        PkgSpec::new(name, arch, Version::parse(version).unwrap())
    }

    fn repos(list: Vec<(&str, i32, Vec<PkgSpec>)>) -> RepoMap {
        list.into_iter()
            .map(|(url, priority, packages)| (url.to_string(), Repo::new(url, priority, packages)))
            .collect()
    }

    #[test]
    fn test_greatest_version_within_priority() {
        let map = repos(vec![(
            "https://stable",
            PRIORITY_DEFAULT,
            vec![
                spec("foo", Arch::Noarch, "1.0"),
                spec("foo", Arch::Noarch, "1.10"),
                spec("foo", Arch::Noarch, "1.9"),
            ],
        )]);
        let c = select_latest("foo", Arch::X86_64, &map).unwrap();
        assert_eq!(c.spec.version.as_str(), "1.10");
    }

    #[test]
    fn test_priority_dominates_version() {
        let map = repos(vec![
            ("https://stable", PRIORITY_DEFAULT, vec![spec("foo", Arch::Noarch, "2.0")]),
            ("https://rollback", PRIORITY_ROLLBACK, vec![spec("foo", Arch::Noarch, "1.0")]),
        ]);
        let c = select_latest("foo", Arch::Noarch, &map).unwrap();
        assert_eq!(c.spec.version.as_str(), "1.0");
        assert_eq!(c.repo.url, "https://rollback");
    }

    #[test]
    fn test_lower_priority_used_only_when_higher_lacks_package() {
        let map = repos(vec![
            ("https://stable", PRIORITY_DEFAULT, vec![spec("foo", Arch::Noarch, "2.0")]),
            ("https://canary", PRIORITY_CANARY, vec![spec("bar", Arch::Noarch, "9")]),
        ]);
        assert_eq!(
            select_latest("foo", Arch::Noarch, &map).unwrap().repo.url,
            "https://stable"
        );
    }

    #[test]
    fn test_arch_filter_accepts_noarch() {
        let map = repos(vec![(
            "https://r",
            PRIORITY_DEFAULT,
            vec![spec("foo", Arch::Arm64, "3"), spec("foo", Arch::Noarch, "2")],
        )]);
        assert_eq!(
            select_latest("foo", Arch::X86_64, &map).unwrap().spec.version.as_str(),
            "2"
        );
        assert_eq!(
            select_latest("foo", Arch::Arm64, &map).unwrap().spec.version.as_str(),
            "3"
        );
    }

    #[test]
    fn test_exact_arch_beats_noarch_at_equal_version() {
        let map = repos(vec![(
            "https://r",
            PRIORITY_DEFAULT,
            vec![spec("foo", Arch::Noarch, "1"), spec("foo", Arch::X86_64, "1")],
        )]);
        let c = select_latest("foo", Arch::X86_64, &map).unwrap();
        assert_eq!(c.spec.arch, Arch::X86_64);
    }

    #[test]
    fn test_equal_priority_tie_goes_to_smallest_url() {
        let offer = || vec![spec("foo", Arch::Noarch, "1")];
        let map = repos(vec![
            ("https://b.example", PRIORITY_DEFAULT, offer()),
            ("https://a.example", PRIORITY_DEFAULT, offer()),
        ]);
        for _ in 0..3 {
            assert_eq!(
                select_latest("foo", Arch::Noarch, &map).unwrap().repo.url,
                "https://a.example"
            );
        }
    }

    #[test]
    fn test_duplicate_in_one_repo_first_listed_wins() {
        let mut first = spec("foo", Arch::Noarch, "1");
        first.checksum = "first".to_string();
        let mut second = spec("foo", Arch::Noarch, "1");
        second.checksum = "second".to_string();
        let map = repos(vec![("https://r", PRIORITY_DEFAULT, vec![first, second])]);
        assert_eq!(
            select_latest("foo", Arch::Noarch, &map).unwrap().spec.checksum,
            "first"
        );
    }

    #[test]
    fn test_no_candidate() {
        let map = repos(vec![("https://r", PRIORITY_DEFAULT, vec![])]);
        assert!(matches!(
            select_latest("foo", Arch::Noarch, &map),
            Err(Error::NoCandidate(_))
        ));
    }

    #[test]
    fn test_select_request_by_version_and_arch_preference() {
        let map = repos(vec![(
            "https://r",
            PRIORITY_DEFAULT,
            vec![
                spec("foo", Arch::X86_64, "1"),
                spec("foo", Arch::X86_64, "2"),
                spec("foo", Arch::Arm64, "5"),
            ],
        )]);
        let archs = [Arch::X86_64, Arch::Noarch];

        let latest = select_request(&PackageRequest::parse("foo").unwrap(), &archs, &map).unwrap();
        assert_eq!(latest.spec.ident().to_string(), "foo.x86_64.2");

        let pinned =
            select_request(&PackageRequest::parse("foo.x86_64.1").unwrap(), &archs, &map).unwrap();
        assert_eq!(pinned.spec.version.as_str(), "1");

        let explicit =
            select_request(&PackageRequest::parse("foo.arm64").unwrap(), &archs, &map).unwrap();
        assert_eq!(explicit.spec.version.as_str(), "5");

        assert!(matches!(
            select_request(&PackageRequest::parse("foo.x86_64.3").unwrap(), &archs, &map),
            Err(Error::NoCandidate(_))
        ));
    }

    #[test]
    fn test_download_url_joins_source() {
        let map = repos(vec![(
            "https://r/stable",
            PRIORITY_DEFAULT,
            vec![spec("foo", Arch::Noarch, "1")],
        )]);
        let c = select_latest("foo", Arch::Noarch, &map).unwrap();
        assert_eq!(
            c.download_url().unwrap().as_str(),
            "https://r/stable/foo.noarch.1.goo"
        );
    }
}
