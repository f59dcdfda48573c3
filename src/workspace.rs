//! Everything a command needs to resolve and build: formulas, manifest and
//! source trees, loaded from the configured paths.

use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::formula::{load_formulas, DirSourceProvider, FormulaRegistry};
use crate::manifest::StaticManifest;
use crate::module::{validate_module_path, ModuleRef};
use crate::resolve::Resolver;
use tracing::debug;

pub struct Workspace {
    pub registry: FormulaRegistry,
    pub manifest: StaticManifest,
    pub sources: DirSourceProvider,
}

impl Workspace {
    /// Load formulas and the static manifest named by `config`
    pub async fn load(config: &Config) -> KilnResult<Self> {
        let paths = &config.paths;
        let registry = load_formulas(
            &paths.formulas_dir,
            &paths.sources_dir,
            &paths.build_dir,
            config.build.jobs(),
        )
        .await?;
        let manifest = StaticManifest::load(&paths.manifest).await?;
        debug!(
            formulas = registry.len(),
            manifest = %paths.manifest.display(),
            "Workspace loaded"
        );

        Ok(Self {
            registry,
            manifest,
            sources: DirSourceProvider::new(&paths.sources_dir),
        })
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registry, &self.manifest, &self.sources)
    }

    /// Turn a CLI module argument into a concrete root.
    ///
    /// Accepts `path@version` or a bare path; without any version the latest
    /// known one is used.
    pub fn root_module(&self, module: &str, version: Option<&str>) -> KilnResult<ModuleRef> {
        let (path, inline) = match module.rsplit_once('@') {
            Some((path, v)) => (path, Some(v)),
            None => (module, None),
        };
        validate_module_path(path)?;

        match (inline, version) {
            (Some(a), Some(b)) if a != b => Err(KilnError::User(format!(
                "conflicting versions for {}: '{}' and '{}'",
                path, a, b
            ))),
            (Some(v), _) | (None, Some(v)) if !v.trim().is_empty() => {
                Ok(ModuleRef::new(path, v.trim()))
            }
            (Some(_), _) | (None, Some(_)) => Err(KilnError::ModulePathInvalid {
                path: module.to_string(),
                reason: "version is empty".to_string(),
            }),
            (None, None) => {
                let latest = self.resolver().latest_version(path)?;
                debug!(path, version = %latest, "Using latest version");
                Ok(ModuleRef::new(path, latest))
            }
        }
    }
}
