// src/packages/ident.rs

//! Package identifiers: `name.arch.version` triples, partial requests and
//! wildcard patterns

use crate::error::{Error, Result};
use crate::version::{Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target architecture tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Arch {
    /// Architecture-independent; matches every concrete arch
    Noarch,
    X86_32,
    X86_64,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::Noarch, Arch::X86_32, Arch::X86_64, Arch::Arm64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Noarch => "noarch",
            Arch::X86_32 => "x86_32",
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Architecture of the running host
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86" => Arch::X86_32,
            "aarch64" => Arch::Arm64,
            _ => Arch::X86_64,
        }
    }

    /// Whether a package built for `self` can satisfy a request for `wanted`
    pub fn is_compatible_with(&self, wanted: Arch) -> bool {
        *self == wanted || *self == Arch::Noarch
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "noarch" => Ok(Arch::Noarch),
            "x86_32" => Ok(Arch::X86_32),
            "x86_64" => Ok(Arch::X86_64),
            "arm64" => Ok(Arch::Arm64),
            _ => Err(Error::MalformedIdentifier(format!("unknown arch '{}'", s))),
        }
    }
}

impl TryFrom<String> for Arch {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Arch> for String {
    fn from(a: Arch) -> Self {
        a.as_str().to_string()
    }
}

/// Validate a package name: non-empty, printable, and free of components
/// that would be mistaken for an arch when the identifier is re-parsed
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MalformedIdentifier("empty package name".to_string()));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::MalformedIdentifier(format!(
            "package name '{}' contains whitespace",
            name
        )));
    }
    if name.split('.').any(|part| part.is_empty() || part.parse::<Arch>().is_ok()) {
        return Err(Error::MalformedIdentifier(format!(
            "package name '{}' is ambiguous",
            name
        )));
    }
    Ok(())
}

/// Split `s` at the first dot-separated component that is an arch tag
/// (or, when `allow_wildcard` is set, `*`)
///
/// Returns (name, arch-token, remainder).
fn split_at_arch(s: &str, allow_wildcard: bool) -> Option<(&str, &str, Option<&str>)> {
    let mut offset = 0;
    for (i, part) in s.split('.').enumerate() {
        let is_arch = part.parse::<Arch>().is_ok() || (allow_wildcard && part == "*");
        if i > 0 && is_arch {
            let name = &s[..offset - 1];
            let rest_start = offset + part.len();
            let rest = if rest_start < s.len() {
                Some(&s[rest_start + 1..])
            } else {
                None
            };
            return Some((name, part, rest));
        }
        offset += part.len() + 1;
    }
    None
}

/// Name plus arch: the database key of an installed package
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageKey {
    pub name: String,
    pub arch: Arch,
}

impl PackageKey {
    pub fn new(name: impl Into<String>, arch: Arch) -> Self {
        Self {
            name: name.into(),
            arch,
        }
    }

    /// Parse `name.arch`
    pub fn parse(s: &str) -> Result<Self> {
        match split_at_arch(s, false) {
            Some((name, arch, None)) => {
                validate_name(name)?;
                Ok(Self::new(name, arch.parse()?))
            }
            _ => Err(Error::MalformedIdentifier(format!(
                "'{}' is not of the form name.arch",
                s
            ))),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.arch)
    }
}

/// A fully qualified package identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdent {
    pub name: String,
    pub arch: Arch,
    pub version: Version,
}

impl PackageIdent {
    pub fn new(name: impl Into<String>, arch: Arch, version: Version) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            arch,
            version,
        })
    }

    /// Parse `name.arch.version`
    pub fn parse(s: &str) -> Result<Self> {
        match split_at_arch(s, false) {
            Some((name, arch, Some(version))) => {
                Self::new(name, arch.parse()?, Version::parse(version)?)
            }
            _ => Err(Error::MalformedIdentifier(format!(
                "'{}' is not of the form name.arch.version",
                s
            ))),
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(self.name.clone(), self.arch)
    }
}

impl fmt::Display for PackageIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.name, self.arch, self.version)
    }
}

impl FromStr for PackageIdent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A package as named on the command line: `name`, `name.arch` or
/// `name.arch.version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: String,
    pub arch: Option<Arch>,
    pub version: Option<Version>,
}

impl PackageRequest {
    pub fn parse(s: &str) -> Result<Self> {
        match split_at_arch(s, false) {
            Some((name, arch, version)) => {
                validate_name(name)?;
                Ok(Self {
                    name: name.to_string(),
                    arch: Some(arch.parse()?),
                    version: version.map(Version::parse).transpose()?,
                })
            }
            None => {
                validate_name(s)?;
                Ok(Self {
                    name: s.to_string(),
                    arch: None,
                    version: None,
                })
            }
        }
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(arch) = self.arch {
            write!(f, ".{}", arch)?;
        }
        if let Some(ref version) = self.version {
            write!(f, ".{}", version)?;
        }
        Ok(())
    }
}

/// Wildcard predicate over identifiers: `name.arch.version` where each
/// position may be `*`, and the version may also be a `V+` floor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentPattern {
    pub name: Option<String>,
    pub arch: Option<Arch>,
    pub version: VersionConstraint,
}

impl IdentPattern {
    pub fn parse(s: &str) -> Result<Self> {
        let malformed = || {
            Error::MalformedIdentifier(format!(
                "'{}' is not a pattern of the form name.arch.version",
                s
            ))
        };

        // A lone name (or `*`) matches every arch and version
        if !s.contains('.') {
            let name = if s == "*" {
                None
            } else {
                validate_name(s)?;
                Some(s.to_string())
            };
            return Ok(Self {
                name,
                arch: None,
                version: VersionConstraint::Any,
            });
        }

        let (name, arch, version) = split_at_arch(s, true).ok_or_else(malformed)?;
        let name = if name == "*" {
            None
        } else {
            validate_name(name)?;
            Some(name.to_string())
        };
        let arch = if arch == "*" { None } else { Some(arch.parse()?) };
        let version = match version {
            Some(v) => VersionConstraint::parse(v)?,
            None => VersionConstraint::Any,
        };

        Ok(Self {
            name,
            arch,
            version,
        })
    }

    pub fn matches(&self, ident: &PackageIdent) -> bool {
        self.name.as_ref().is_none_or(|n| *n == ident.name)
            && self.arch.is_none_or(|a| a == ident.arch)
            && self.version.satisfies(&ident.version)
    }
}

impl fmt::Display for IdentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.name.as_deref().unwrap_or("*"),
            self.arch.map(|a| a.as_str()).unwrap_or("*"),
            self.version
        )
    }
}

impl Serialize for IdentPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IdentPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IdentPattern::parse(&s).map_err(serde::de::Error::custom)
    }
}
