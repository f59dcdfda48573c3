//! Static dependency manifest
//!
//! The fallback source of dependency information, consulted when a formula's
//! discovery handler is absent, fails, or declares nothing:
//!
//! ```toml
//! [modules."pnggroup/libpng"]
//! "1.6.43" = ["madler/zlib@1.2.0"]
//!
//! [modules."madler/zlib"]
//! "1.3.1" = []
//! ```

use crate::error::{KilnError, KilnResult};
use crate::module::{validate_module_path, DepSpec, ModuleRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Per module path, a map from exact version to its fixed dependency list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticManifest {
    #[serde(default)]
    modules: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl StaticManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest file; a missing file is an empty manifest
    pub async fn load(path: &Path) -> KilnResult<Self> {
        if !path.exists() {
            debug!("Manifest {} not found, using an empty one", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading manifest {}", path.display()), e))?;
        Self::parse(&content, path)
    }

    /// Parse manifest TOML, validating every module path and dependency entry
    pub fn parse(content: &str, origin: &Path) -> KilnResult<Self> {
        let invalid = |reason: String| KilnError::ManifestInvalid {
            path: origin.to_path_buf(),
            reason,
        };

        let manifest: Self = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        for (path, versions) in &manifest.modules {
            validate_module_path(path).map_err(|e| invalid(e.to_string()))?;
            for (version, deps) in versions {
                if let Some(bad) = deps.iter().find(|d| DepSpec::parse(d).is_none()) {
                    return Err(invalid(format!(
                        "{}@{}: invalid dependency '{}', expected <path>@<minVersion>",
                        path, version, bad
                    )));
                }
            }
        }

        Ok(manifest)
    }

    /// Record a fixed dependency list for one module version
    pub fn insert(&mut self, module: &ModuleRef, deps: &[DepSpec]) {
        self.modules
            .entry(module.path.clone())
            .or_default()
            .insert(
                module.version.clone(),
                deps.iter().map(ToString::to_string).collect(),
            );
    }

    /// Dependency list for an exact module version
    pub fn lookup(&self, module: &ModuleRef) -> Option<Vec<DepSpec>> {
        let deps = self.modules.get(&module.path)?.get(&module.version)?;
        Some(deps.iter().filter_map(|d| DepSpec::parse(d)).collect())
    }

    /// Versions listed for `path`
    pub fn versions(&self, path: &str) -> Vec<&str> {
        self.modules
            .get(path)
            .map(|v| v.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
