//! Module identity types shared by the resolver, scheduler and cache

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A module at a specific tagged version.
///
/// `path` is a stable identifier such as `madler/zlib`; `version` is a tag in
/// the upstream project's own scheme. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleRef {
    pub path: String,
    pub version: String,
}

impl ModuleRef {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    /// Parse `owner/repo@version`
    pub fn parse(s: &str) -> KilnResult<Self> {
        let (path, version) = s.rsplit_once('@').ok_or_else(|| KilnError::ModulePathInvalid {
            path: s.to_string(),
            reason: "expected <path>@<version>".to_string(),
        })?;
        validate_module_path(path)?;
        validate_version(version.trim())?;
        Ok(Self::new(path, version.trim()))
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.version)
    }
}

/// A declared dependency: a module path and the minimum version required
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepSpec {
    pub path: String,
    pub min_version: String,
}

impl DepSpec {
    pub fn new(path: impl Into<String>, min_version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            min_version: min_version.into(),
        }
    }

    /// Parse `owner/repo@minVersion` or `owner/repo minVersion`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (path, version) = s
            .rsplit_once('@')
            .or_else(|| s.split_once(char::is_whitespace))?;
        let (path, version) = (path.trim(), version.trim());
        if validate_version(version).is_err() || validate_module_path(path).is_err() {
            return None;
        }
        Some(Self::new(path, version))
    }
}

impl fmt::Display for DepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.min_version)
    }
}

/// Validate that a module path is safe to use as a directory fragment.
pub fn validate_module_path(path: &str) -> KilnResult<()> {
    let invalid = |reason: &str| {
        Err(KilnError::ModulePathInvalid {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };

    if path.is_empty() {
        return invalid("path is empty");
    }
    if path.starts_with('/') || path.ends_with('/') {
        return invalid("must not start or end with '/'");
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return invalid("must not contain empty, '.' or '..' segments");
    }
    if !path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return invalid("only alphanumerics, '-', '_', '.' and '/' are allowed");
    }
    Ok(())
}

/// Validate a version tag. Versions become a directory level under the
/// sources, build and install roots, so they must be a single safe segment.
pub fn validate_version(version: &str) -> KilnResult<()> {
    let invalid = |reason: &str| {
        Err(KilnError::VersionInvalid {
            version: version.to_string(),
            reason: reason.to_string(),
        })
    };

    if version.is_empty() {
        return invalid("version is empty");
    }
    if version.contains(['/', '\\']) {
        return invalid("must not contain path separators");
    }
    if version.contains("..") {
        return invalid("must not contain '..'");
    }
    if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid("must not contain whitespace");
    }
    Ok(())
}

/// A target platform/architecture combination, e.g. `amd64-linux`.
///
/// Opaque to the engine; formulas and build tools interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixVariant(String);

impl MatrixVariant {
    pub fn parse(s: &str) -> KilnResult<Self> {
        let s = s.trim();
        if s.is_empty()
            || !s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(KilnError::VariantInvalid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Variant describing the machine kiln runs on
    pub fn host() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        Self(format!("{}-{}", arch, os))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Architecture part (before the first '-')
    pub fn arch(&self) -> &str {
        self.0.split_once('-').map_or(self.0.as_str(), |(a, _)| a)
    }

    /// OS part (after the first '-'), empty if the variant has no '-'
    pub fn os(&self) -> &str {
        self.0.split_once('-').map_or("", |(_, o)| o)
    }
}

impl fmt::Display for MatrixVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity under which a build result is stored: one per module and variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub module: ModuleRef,
    pub variant: MatrixVariant,
}

impl CacheKey {
    pub fn new(module: ModuleRef, variant: MatrixVariant) -> Self {
        Self { module, variant }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.module, self.variant)
    }
}
