//! Semantic Versioning precedence

use super::debian::compare_versions;
use super::VersionComparator;
use semver::Version;
use std::cmp::Ordering;

/// Orders versions by semver precedence.
///
/// Build metadata is ignored, as precedence requires. Strings that are not
/// valid semver sort before every valid one and among themselves by the
/// Debian rules, so the ordering stays total for arbitrary tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverComparator;

impl VersionComparator for SemverComparator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (parse(a), parse(b)) {
            (Some(a), Some(b)) => precedence(&a, &b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => compare_versions(a, b),
        }
    }

    fn name(&self) -> &'static str {
        "semver"
    }
}

fn parse(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    Version::parse(version).ok()
}

fn precedence(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

#[cfg(test)]
mod tests {
    use super::*;
    use Ordering::*;

    #[test]
    fn prerelease_precedes_release() {
        let c = SemverComparator;
        assert_eq!(c.compare("1.0.0-alpha", "1.0.0"), Less);
        assert_eq!(c.compare("1.0.0-alpha", "1.0.0-alpha.1"), Less);
        assert_eq!(c.compare("1.0.0-beta.11", "1.0.0-beta.2"), Greater);
        assert_eq!(c.compare("1.0.0-rc.1", "1.0.0-beta.11"), Greater);
    }

    #[test]
    fn build_metadata_ignored() {
        let c = SemverComparator;
        assert_eq!(c.compare("1.0.0+build.1", "1.0.0+build.2"), Equal);
        assert_eq!(c.compare("v2.1.0", "2.1.0+meta"), Equal);
    }

    #[test]
    fn non_semver_sorts_first() {
        let c = SemverComparator;
        assert_eq!(c.compare("1.2", "0.0.1"), Less);
        assert_eq!(c.compare("0.0.1", "nightly"), Greater);
        assert_eq!(c.compare("1.2", "1.10"), Less);
    }

    #[test]
    fn satisfies_minimum() {
        let c = SemverComparator;
        assert!(c.satisfies("1.3.0", "1.2.11"));
        assert!(c.satisfies("1.2.11", "1.2.11"));
        assert!(!c.satisfies("1.3.0-rc.1", "1.3.0"));
    }
}
