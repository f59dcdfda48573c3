//! Version ordering
//!
//! A [`VersionComparator`] gives a total order over version strings and the
//! derived "satisfies minimum version" test. Debian-style ordering is the
//! default; modules may register an alternate strategy by path through a
//! [`ComparatorRegistry`].

mod debian;
mod semantic;

pub use debian::{compare_versions, DebianComparator};
pub use semantic::SemverComparator;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Total order over version strings
pub trait VersionComparator: Send + Sync + fmt::Debug {
    /// Compare two versions. Stable and total for fixed inputs.
    fn compare(&self, a: &str, b: &str) -> Ordering;

    /// True iff `version` is at least `from_ver`
    fn satisfies(&self, version: &str, from_ver: &str) -> bool {
        self.compare(version, from_ver) != Ordering::Less
    }

    /// Short name used in formula files and diagnostics
    fn name(&self) -> &'static str;
}

/// Look up a built-in comparator by name (`debian` or `semver`)
pub fn comparator_by_name(name: &str) -> Option<Arc<dyn VersionComparator>> {
    match name {
        "debian" | "deb" => Some(Arc::new(DebianComparator)),
        "semver" => Some(Arc::new(SemverComparator)),
        _ => None,
    }
}

/// Per-module-path comparator overrides with a shared default
#[derive(Debug, Clone)]
pub struct ComparatorRegistry {
    default: Arc<dyn VersionComparator>,
    overrides: HashMap<String, Arc<dyn VersionComparator>>,
}

impl ComparatorRegistry {
    pub fn new() -> Self {
        Self {
            default: Arc::new(DebianComparator),
            overrides: HashMap::new(),
        }
    }

    /// Use `comparator` for every version of `path`
    pub fn register(&mut self, path: impl Into<String>, comparator: Arc<dyn VersionComparator>) {
        self.overrides.insert(path.into(), comparator);
    }

    /// The comparator for `path`: its override if any, else the default
    pub fn for_path(&self, path: &str) -> &dyn VersionComparator {
        self.overrides
            .get(path)
            .map_or(self.default.as_ref(), |c| c.as_ref())
    }

    /// Greatest version of `path` among `versions`.
    ///
    /// Ties keep the first occurrence so the choice is stable.
    pub fn latest<'a, I>(&self, path: &str, versions: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let cmp = self.for_path(path);
        versions.into_iter().fold(None, |best, v| match best {
            Some(b) if cmp.compare(v, b) != Ordering::Greater => Some(b),
            _ => Some(v),
        })
    }
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfies_is_reflexive() {
        for v in ["1.0", "v2.3.4", "1.0~rc1", "OpenSSL_3_0_0", "", "1:0"] {
            assert!(DebianComparator.satisfies(v, v), "{}", v);
            assert!(SemverComparator.satisfies(v, v), "{}", v);
        }
    }

    #[test]
    fn equality_is_transitive() {
        let samples = [
            "1.0", "1.00", "v1.0", "1.0.0", "1.0.0+b1", "v1.0.0", "1.0-0", "2", "02", "1.0~a",
        ];
        for cmp in [&DebianComparator as &dyn VersionComparator, &SemverComparator] {
            for a in samples {
                for b in samples {
                    for c in samples {
                        if cmp.compare(a, b) == Ordering::Equal
                            && cmp.compare(b, c) == Ordering::Equal
                        {
                            assert_eq!(cmp.compare(a, c), Ordering::Equal, "{} {} {}", a, b, c);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn registry_prefers_override() {
        let mut registry = ComparatorRegistry::new();
        registry.register("semver/lib", Arc::new(SemverComparator));

        assert_eq!(registry.for_path("semver/lib").name(), "semver");
        assert_eq!(registry.for_path("other/lib").name(), "debian");
    }

    #[test]
    fn latest_uses_module_comparator() {
        let mut registry = ComparatorRegistry::new();
        registry.register("s/s", Arc::new(SemverComparator));

        let versions = ["1.0.0", "1.0.0-rc.1", "0.9.9"];
        assert_eq!(registry.latest("s/s", versions), Some("1.0.0"));
        assert_eq!(registry.latest("d/d", ["1.2", "1.10", "1.9"]), Some("1.10"));
        assert_eq!(registry.latest("d/d", Vec::<&str>::new()), None);
    }

    #[test]
    fn comparator_lookup_by_name() {
        assert_eq!(comparator_by_name("semver").unwrap().name(), "semver");
        assert_eq!(comparator_by_name("debian").unwrap().name(), "debian");
        assert!(comparator_by_name("calver").is_none());
    }
}
