// src/packages/spec.rs

//! Package specification model
//!
//! A [`PkgSpec`] is the authoritative description of one package version as
//! published in a repository manifest. It is also stored verbatim in the
//! installed-state database so uninstall and verify can run without the
//! repository.

use crate::error::Result;
use crate::packages::ident::{Arch, IdentPattern, PackageIdent, PackageKey};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An install, uninstall or verify command shipped inside the archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Archive-relative path of the script or installer
    pub path: String,
    /// Extra arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Exit codes treated as success in addition to 0
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit_codes: Vec<i32>,
}

impl Script {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self, code: i32) -> bool {
        code == 0 || self.exit_codes.contains(&code)
    }
}

/// A dependency edge derived from a spec: `dep-name.dep-arch >= min-version`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyRequest {
    pub name: String,
    pub arch: Arch,
    pub min_version: Version,
}

impl DependencyRequest {
    pub fn key(&self) -> PackageKey {
        PackageKey::new(self.name.clone(), self.arch)
    }

    /// Whether an installed or candidate identifier satisfies this request
    pub fn is_satisfied_by(&self, ident: &PackageIdent) -> bool {
        ident.name == self.name
            && ident.arch.is_compatible_with(self.arch)
            && ident.version >= self.min_version
    }
}

impl fmt::Display for DependencyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} >= {}", self.name, self.arch, self.min_version)
    }
}

/// The authoritative description of a package version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkgSpec {
    pub name: String,
    pub arch: Arch,
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// `name` or `name.arch` mapped to the minimum acceptable version
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Version>,
    /// Names (or patterns) of packages that may not be installed alongside
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<IdentPattern>,
    /// Installed packages matching any of these are removed on install
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaces: Vec<IdentPattern>,
    /// Install-relative path mapped to the expected SHA-256 of the file
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<Script>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall: Option<Script>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<Script>,

    /// Archive path relative to the repository base URL
    #[serde(default)]
    pub source: String,
    /// SHA-256 of the archive
    #[serde(default)]
    pub checksum: String,
}

impl PkgSpec {
    /// Minimal spec for a name/arch/version
    pub fn new(name: impl Into<String>, arch: Arch, version: Version) -> Self {
        let name = name.into();
        let source = format!("{}.{}.{}.goo", name, arch, version);
        Self {
            name,
            arch,
            version,
            description: None,
            authors: None,
            license: None,
            source_url: None,
            dependencies: BTreeMap::new(),
            conflicts: Vec::new(),
            replaces: Vec::new(),
            files: BTreeMap::new(),
            install: None,
            uninstall: None,
            verify: None,
            source,
            checksum: String::new(),
        }
    }

    pub fn ident(&self) -> PackageIdent {
        PackageIdent {
            name: self.name.clone(),
            arch: self.arch,
            version: self.version.clone(),
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(self.name.clone(), self.arch)
    }

    /// Reject specs whose name cannot round-trip through an identifier
    pub fn validate(&self) -> Result<()> {
        PackageIdent::new(self.name.clone(), self.arch, self.version.clone()).map(|_| ())
    }

    /// Dependency requests, inheriting this package's arch unless the
    /// dependency names one explicitly (`name.arch`)
    pub fn dependency_requests(&self) -> Vec<DependencyRequest> {
        self.dependencies
            .iter()
            .map(|(dep, min_version)| {
                let (name, arch) = match PackageKey::parse(dep) {
                    Ok(key) => (key.name, key.arch),
                    Err(_) => (dep.clone(), self.arch),
                };
                DependencyRequest {
                    name,
                    arch,
                    min_version: min_version.clone(),
                }
            })
            .collect()
    }

    /// Whether `other` is listed in this spec's conflicts
    pub fn conflicts_with(&self, other: &PackageIdent) -> bool {
        self.conflicts.iter().any(|p| p.matches(other))
    }

    /// Whether installing this spec removes `installed`
    pub fn replaces_ident(&self, installed: &PackageIdent) -> bool {
        self.replaces.iter().any(|p| p.matches(installed))
    }

    /// Cache file name: `name.arch.version.goo`
    pub fn archive_name(&self) -> String {
        format!("{}.goo", self.ident())
    }
}

impl fmt::Display for PkgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ident())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_dependency_requests_inherit_arch() {
        let mut spec = PkgSpec::new("app", Arch::X86_64, v("1.0"));
        spec.dependencies.insert("runtime".to_string(), v("2.0"));
        spec.dependencies.insert("helper.noarch".to_string(), v("0.1"));

        let deps = spec.dependency_requests();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "helper");
        assert_eq!(deps[0].arch, Arch::Noarch);
        assert_eq!(deps[1].name, "runtime");
        assert_eq!(deps[1].arch, Arch::X86_64);
        assert_eq!(deps[1].min_version, v("2.0"));
    }

    #[test]
    fn test_dependency_satisfaction() {
        let dep = DependencyRequest {
            name: "lib".to_string(),
            arch: Arch::X86_64,
            min_version: v("2"),
        };
        assert!(dep.is_satisfied_by(&PackageIdent::parse("lib.x86_64.2").unwrap()));
        assert!(dep.is_satisfied_by(&PackageIdent::parse("lib.noarch.3").unwrap()));
        assert!(!dep.is_satisfied_by(&PackageIdent::parse("lib.x86_64.1.9").unwrap()));
        assert!(!dep.is_satisfied_by(&PackageIdent::parse("lib.arm64.5").unwrap()));
    }

    #[test]
    fn test_replaces_and_conflicts() {
        let mut spec = PkgSpec::new("B", Arch::Noarch, v("2"));
        spec.replaces.push(IdentPattern::parse("A.*.3+").unwrap());
        spec.conflicts.push(IdentPattern::parse("legacy").unwrap());

        assert!(spec.replaces_ident(&PackageIdent::parse("A.noarch.5").unwrap()));
        assert!(!spec.replaces_ident(&PackageIdent::parse("A.noarch.1").unwrap()));
        assert!(spec.conflicts_with(&PackageIdent::parse("legacy.x86_64.9").unwrap()));
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = r#"{
            "name": "B",
            "arch": "noarch",
            "version": "2",
            "dependencies": {"C": "1"},
            "replaces": ["A.*.3+"],
            "files": {"bin/b.txt": "abc"},
            "install": {"path": "install.sh", "exit_codes": [3010]},
            "source": "pool/B.noarch.2.goo",
            "checksum": "deadbeef"
        }"#;
        let spec: PkgSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.ident().to_string(), "B.noarch.2");
        assert_eq!(spec.replaces.len(), 1);
        assert!(spec.install.as_ref().unwrap().is_success(3010));
        assert!(!spec.install.as_ref().unwrap().is_success(1));
        assert_eq!(spec.archive_name(), "B.noarch.2.goo");

        let back: PkgSpec = serde_json::from_str(&serde_json::to_string(&spec).unwrap()).unwrap();
        assert_eq!(back, spec);
    }
}
