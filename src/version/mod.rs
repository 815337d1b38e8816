// src/version/mod.rs

//! Version handling for package identifiers
//!
//! Versions are opaque strings with a single total order:
//!
//! - The string is split into a base, an optional pre-release (after the
//!   first `-`) and optional build metadata (after the first `+`).
//! - Each part is split into components on `.`, `-` and `+`; components are
//!   compared pairwise, numeric components numerically, everything else
//!   lexicographically, and a numeric component sorts before a textual one.
//! - A shorter component list that is a prefix of a longer one sorts first.
//! - At the same base, a pre-release sorts before the plain release.
//! - Remaining ties (e.g. `1.01` vs `1.1`) are broken by comparing the raw
//!   strings, so the order is consistent with string equality.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A package version with GooGet ordering semantics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Parse a version string
    ///
    /// Any non-empty string without whitespace is a valid version.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::MalformedIdentifier("empty version".to_string()));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::MalformedIdentifier(format!(
                "version '{}' contains whitespace",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into (base, pre-release, build) parts
    fn parts(&self) -> (&str, Option<&str>, Option<&str>) {
        let (rest, build) = match self.0.split_once('+') {
            Some((r, b)) => (r, Some(b)),
            None => (self.0.as_str(), None),
        };
        match rest.split_once('-') {
            Some((base, pre)) => (base, Some(pre), build),
            None => (rest, None, build),
        }
    }
}

fn components(s: &str) -> impl Iterator<Item = &str> {
    s.split(['.', '-', '+'])
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two numeric components without overflowing on long digit runs
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_component(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => compare_numeric(a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn compare_components(a: &str, b: &str) -> Ordering {
    let mut left = components(a);
    let mut right = components(b);
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match compare_component(x, y) {
                Ordering::Equal => {}
                ord => return ord,
            },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (base_a, pre_a, build_a) = self.parts();
        let (base_b, pre_b, build_b) = other.parts();

        compare_components(base_a, base_b)
            .then_with(|| match (pre_a, pre_b) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_components(a, b),
            })
            .then_with(|| match (build_a, build_b) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => compare_components(a, b),
            })
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.0
    }
}

/// Version predicate used by replacement patterns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    /// `*`
    Any,
    /// An exact version
    Exact(Version),
    /// `V+`: version greater than or equal to V
    AtLeast(Version),
}

impl VersionConstraint {
    /// Parse `*`, `V+` or an exact version
    pub fn parse(s: &str) -> Result<Self> {
        if s == "*" {
            return Ok(VersionConstraint::Any);
        }
        if let Some(floor) = s.strip_suffix('+') {
            return Ok(VersionConstraint::AtLeast(Version::parse(floor)?));
        }
        Ok(VersionConstraint::Exact(Version::parse(s)?))
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => v == version,
            VersionConstraint::AtLeast(v) => version >= v,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => f.write_str("*"),
            VersionConstraint::Exact(v) => write!(f, "{}", v),
            VersionConstraint::AtLeast(v) => write!(f, "{}+", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_components_compare_numerically() {
        assert!(v("1.10") > v("1.9"));
        assert!(v("2") > v("1.99.99"));
        assert!(v("1.0.10") > v("1.0.9"));
        assert!(v("100000000000000000000000") > v("99999999999999999999999"));
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert!(v("1.0") < v("1.0.0"));
        assert!(v("1") < v("1.0"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("1.0.0-beta") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-rc.2") < v("1.0.0-rc.10"));
        assert!(v("1.0.0-rc") < v("1.0.1-alpha"));
    }

    #[test]
    fn test_build_metadata_ordering() {
        assert!(v("1.0.0") < v("1.0.0+1"));
        assert!(v("1.0.0+1") < v("1.0.0+2"));
        assert!(v("1.0.0-beta+5") < v("1.0.0"));
    }

    #[test]
    fn test_text_and_number_components() {
        assert!(v("1.a") > v("1.9"));
        assert!(v("1.a") < v("1.b"));
    }

    #[test]
    fn test_ties_broken_by_string() {
        assert_ne!(v("1.01"), v("1.1"));
        assert_ne!(v("1.01").cmp(&v("1.1")), Ordering::Equal);
        assert_eq!(v("1.1").cmp(&v("1.1")), Ordering::Equal);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1 .0").is_err());
    }

    #[test]
    fn test_constraint_parsing() {
        assert_eq!(VersionConstraint::parse("*").unwrap(), VersionConstraint::Any);
        assert_eq!(
            VersionConstraint::parse("3+").unwrap(),
            VersionConstraint::AtLeast(v("3"))
        );
        assert_eq!(
            VersionConstraint::parse("1.2").unwrap(),
            VersionConstraint::Exact(v("1.2"))
        );

        let floor = VersionConstraint::parse("3+").unwrap();
        assert!(floor.satisfies(&v("5")));
        assert!(floor.satisfies(&v("3")));
        assert!(!floor.satisfies(&v("2.9")));
        assert_eq!(floor.to_string(), "3+");
    }

    fn random_version(rng: &mut StdRng) -> Version {
        const WORDS: [&str; 6] = ["a", "beta", "rc", "0", "01", "x"];
        let mut s = String::new();
        let parts = rng.gen_range(1..5);
        for i in 0..parts {
            if i > 0 {
                s.push(['.', '.', '.', '-', '+'][rng.gen_range(0..5)]);
            }
            if rng.gen_bool(0.7) {
                s.push_str(&rng.gen_range(0..20).to_string());
            } else {
                s.push_str(WORDS[rng.gen_range(0..WORDS.len())]);
            }
        }
        v(&s)
    }

    #[test]
    fn test_total_order_laws_randomized() {
        let mut rng = StdRng::seed_from_u64(0x600_6e7);
        let versions: Vec<Version> = (0..120).map(|_| random_version(&mut rng)).collect();

        for a in &versions {
            // Reflexive
            assert_eq!(a.cmp(a), Ordering::Equal);
            for b in &versions {
                let ab = a.cmp(b);
                // Antisymmetric and consistent with equality
                assert_eq!(ab, b.cmp(a).reverse(), "{} vs {}", a, b);
                assert_eq!(ab == Ordering::Equal, a == b, "{} vs {}", a, b);
                for c in versions.iter().take(40) {
                    // Transitive
                    if ab != Ordering::Greater && b.cmp(c) != Ordering::Greater {
                        assert_ne!(a.cmp(c), Ordering::Greater, "{} <= {} <= {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_sorting_is_stable_under_shuffle() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut versions: Vec<Version> = (0..50).map(|_| random_version(&mut rng)).collect();
        let mut sorted = versions.clone();
        sorted.sort();

        for _ in 0..5 {
            for i in (1..versions.len()).rev() {
                let j = rng.gen_range(0..=i);
                versions.swap(i, j);
            }
            let mut again = versions.clone();
            again.sort();
            assert_eq!(again, sorted);
        }
    }
}
