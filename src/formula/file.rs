//! File-described formulas
//!
//! Formulas live under the formulas directory, one or more TOML files per
//! module (for example `madler/zlib/formula.toml`). Each file serves its
//! module from `from_ver` upward:
//!
//! ```toml
//! [formula]
//! path = "madler/zlib"
//! from_ver = "1.2.0"
//! comparator = "debian"   # or "semver"
//!
//! [discover]
//! file = "kiln.deps"      # "<path> <minVersion>" per line, '#' comments
//!
//! [build]
//! tool = "cmake"          # or "configure"
//! args = ["-DZLIB_BUILD_EXAMPLES=OFF"]
//! metadata = "-lz"
//! ```

use super::{BuildContext, Discovery, Formula, FormulaRegistry, SourceTree};
use crate::adapter::{ToolEnv, ToolKind};
use crate::cache::{BuildError, BuildResult};
use crate::error::{KilnError, KilnResult};
use crate::formula::DirSourceProvider;
use crate::module::{validate_module_path, DepSpec, ModuleRef};
use crate::version::comparator_by_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Parsed formula file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaFile {
    pub formula: FormulaMeta,

    #[serde(default)]
    pub discover: Option<DiscoverSection>,

    pub build: BuildSection,
}

/// `[formula]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaMeta {
    /// Module path served, e.g. `madler/zlib`
    pub path: String,

    /// Minimum version this formula can build
    pub from_ver: String,

    /// Version ordering for this module (`debian` when unset)
    #[serde(default)]
    pub comparator: Option<String>,

    #[serde(default)]
    pub description: String,
}

/// `[discover]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverSection {
    /// Dependency list inside the module's source tree
    pub file: String,
}

/// `[build]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    pub tool: ToolKind,

    /// Extra configure arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Flags dependents need to link against this module
    #[serde(default)]
    pub metadata: String,

    /// Extra environment for every tool step
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl FormulaFile {
    /// Parse a formula from a TOML file on disk
    pub async fn from_file(path: &Path) -> KilnResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading formula {}", path.display()), e))?;
        Self::parse(&content, path)
    }

    /// Parse and validate formula TOML; `origin` is used in error messages
    pub fn parse(content: &str, origin: &Path) -> KilnResult<Self> {
        let invalid = |reason: String| KilnError::FormulaInvalid {
            path: origin.to_path_buf(),
            reason,
        };

        let file: Self = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        validate_module_path(&file.formula.path).map_err(|e| invalid(e.to_string()))?;
        if file.formula.from_ver.trim().is_empty() {
            return Err(invalid("from_ver is empty".to_string()));
        }
        if let Some(name) = &file.formula.comparator {
            if comparator_by_name(name).is_none() {
                return Err(invalid(format!("unknown comparator '{}'", name)));
            }
        }

        Ok(file)
    }
}

/// Parse a dependency list: one `<path> <minVersion>` (or `<path>@<min>`)
/// per line, blank lines and `#` comments ignored.
pub fn parse_dep_list(content: &str) -> Result<Vec<DepSpec>, String> {
    let mut deps = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let dep = DepSpec::parse(line)
            .ok_or_else(|| format!("line {}: expected '<path> <minVersion>', got '{}'", lineno + 1, line))?;
        deps.push(dep);
    }
    Ok(deps)
}

/// A formula whose build hook drives one of the build-tool adapters
pub struct ToolFormula {
    file: FormulaFile,
    sources: DirSourceProvider,
    build_root: PathBuf,
    jobs: usize,
}

impl ToolFormula {
    pub fn new(file: FormulaFile, sources: DirSourceProvider, build_root: PathBuf, jobs: usize) -> Self {
        Self {
            file,
            sources,
            build_root,
            jobs: jobs.max(1),
        }
    }

    fn build_dir(&self, ctx: &BuildContext) -> PathBuf {
        self.build_root
            .join(&ctx.module.path)
            .join(&ctx.module.version)
            .join(ctx.variant.as_str())
    }
}

impl Formula for ToolFormula {
    fn path(&self) -> &str {
        &self.file.formula.path
    }

    fn from_ver(&self) -> &str {
        &self.file.formula.from_ver
    }

    fn discover(&self, module: &ModuleRef, source: &dyn SourceTree) -> Discovery {
        let Some(section) = &self.file.discover else {
            return Discovery::Absent;
        };

        let content = match source.read_to_string(&section.file) {
            Ok(c) => c,
            Err(e) => return Discovery::Failed(e.to_string()),
        };

        match parse_dep_list(&content) {
            Ok(deps) => {
                debug!(module = %module, count = deps.len(), "Discovered dependencies");
                Discovery::Declared(deps)
            }
            Err(reason) => Discovery::Failed(format!("{}: {}", section.file, reason)),
        }
    }

    fn build(&self, ctx: &BuildContext, result: &mut BuildResult) {
        let source_dir = self.sources.tree_dir(&ctx.module);
        if !source_dir.is_dir() {
            result.add_err(BuildError::hook(format!(
                "source tree not found: {}",
                source_dir.display()
            )));
            return;
        }

        let mut env = ToolEnv::new(
            source_dir,
            self.build_dir(ctx),
            result.output_dir.clone(),
            ctx.variant.clone(),
        )
        .with_jobs(self.jobs)
        .with_args(self.file.build.args.clone());
        env.env = self.file.build.env.clone();

        let mut tool = self.file.build.tool.create(env);
        for dep in &ctx.deps {
            tool.use_dep(&dep.output_dir);
        }

        let steps = tool
            .configure()
            .and_then(|_| tool.build())
            .and_then(|_| tool.install());
        if let Err(e) = steps {
            result.add_err(BuildError::hook(e.to_string()));
            return;
        }

        if !result.output_dir.is_dir() {
            result.add_err(BuildError::hook(format!(
                "{} install produced no output directory {}",
                tool.name(),
                result.output_dir.display()
            )));
            return;
        }

        result.metadata = self.file.build.metadata.clone();
    }
}

/// Load every `*.toml` formula under `formulas_dir` into a registry.
///
/// A missing directory yields an empty registry. Files are visited in
/// sorted order so registration order is stable.
pub async fn load_formulas(
    formulas_dir: &Path,
    sources_dir: &Path,
    build_root: &Path,
    jobs: usize,
) -> KilnResult<FormulaRegistry> {
    let mut registry = FormulaRegistry::new();
    let mut comparators: HashMap<String, (String, PathBuf)> = HashMap::new();

    for path in collect_toml_files(formulas_dir).await? {
        let file = FormulaFile::from_file(&path).await?;

        if let Some(name) = &file.formula.comparator {
            if let Some((prev, prev_path)) = comparators.get(&file.formula.path) {
                if prev != name {
                    return Err(KilnError::FormulaInvalid {
                        path: path.clone(),
                        reason: format!(
                            "comparator '{}' conflicts with '{}' declared in {}",
                            name,
                            prev,
                            prev_path.display()
                        ),
                    });
                }
            }
            comparators.insert(file.formula.path.clone(), (name.clone(), path.clone()));
            if let Some(cmp) = comparator_by_name(name) {
                registry.register_comparator(file.formula.path.clone(), cmp);
            }
        }

        registry.register(Arc::new(ToolFormula::new(
            file,
            DirSourceProvider::new(sources_dir),
            build_root.to_path_buf(),
            jobs,
        )));
    }

    debug!(count = registry.len(), dir = %formulas_dir.display(), "Loaded formulas");
    Ok(registry)
}

async fn collect_toml_files(root: &Path) -> KilnResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if dir == root {
                    warn!("Formulas directory {} does not exist", root.display());
                }
                continue;
            }
            Err(e) => {
                return Err(KilnError::io(format!("reading {}", dir.display()), e));
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KilnError::io(format!("reading {}", dir.display()), e))?
        {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "toml") {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
