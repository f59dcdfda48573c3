//! Formulas: per-module discovery and build handlers
//!
//! A formula serves one module path from a minimum version (`from_ver`)
//! upward. It supplies exactly one discovery handler and one build handler,
//! both invoked through the [`Formula`] trait. The engine treats them as
//! callbacks and knows nothing about how a formula is described.

pub mod file;
mod registry;
mod source;

pub use file::{load_formulas, FormulaFile, ToolFormula};
pub use registry::FormulaRegistry;
pub use source::{DirSourceProvider, MemorySourceProvider, SourceProvider, SourceTree};

use crate::cache::BuildResult;
use crate::module::{DepSpec, MatrixVariant, ModuleRef};
use std::path::{Path, PathBuf};

/// What a discovery handler found out about a module's dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// The formula has no discovery handler
    Absent,
    /// Dependencies declared by the module's own build configuration
    Declared(Vec<DepSpec>),
    /// The handler ran but could not determine dependencies
    Failed(String),
}

/// Discovery and build handlers for one module path
pub trait Formula: Send + Sync {
    /// Module path this formula serves
    fn path(&self) -> &str;

    /// Minimum version this formula can build
    fn from_ver(&self) -> &str;

    /// Determine dependencies by inspecting the module's source tree.
    ///
    /// The default is [`Discovery::Absent`], which sends the resolver to the
    /// static manifest.
    fn discover(&self, _module: &ModuleRef, _source: &dyn SourceTree) -> Discovery {
        Discovery::Absent
    }

    /// Compile and install `ctx.module` for `ctx.variant` into
    /// `result.output_dir`, recording failures in `result.errs`.
    ///
    /// Runs on a blocking worker thread.
    fn build(&self, ctx: &BuildContext, result: &mut BuildResult);
}

/// Install location and metadata of an already-built dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepInstall {
    pub module: ModuleRef,
    pub output_dir: PathBuf,
    pub metadata: String,
    /// Declared directly by the module being built
    pub direct: bool,
}

/// Everything a build hook gets to see
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub module: ModuleRef,
    pub variant: MatrixVariant,
    /// Every transitive dependency, dependencies before their dependents
    pub deps: Vec<DepInstall>,
}

impl BuildContext {
    /// Install directory of an already-built dependency
    pub fn install_dir_of(&self, module: &ModuleRef) -> Option<&Path> {
        self.deps
            .iter()
            .find(|d| &d.module == module)
            .map(|d| d.output_dir.as_path())
    }

    /// Metadata recorded by an already-built dependency
    pub fn metadata_of(&self, module: &ModuleRef) -> Option<&str> {
        self.deps
            .iter()
            .find(|d| &d.module == module)
            .map(|d| d.metadata.as_str())
    }

    /// Dependencies declared directly by this module
    pub fn direct_deps(&self) -> impl Iterator<Item = &DepInstall> {
        self.deps.iter().filter(|d| d.direct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_dir_lookup() {
        let zlib = ModuleRef::new("madler/zlib", "1.3");
        let png = ModuleRef::new("pnggroup/libpng", "1.6");
        let ctx = BuildContext {
            module: ModuleRef::new("root/root", "1"),
            variant: MatrixVariant::parse("amd64-linux").unwrap(),
            deps: vec![
                DepInstall {
                    module: zlib.clone(),
                    output_dir: "/out/zlib".into(),
                    metadata: "-lz".into(),
                    direct: false,
                },
                DepInstall {
                    module: png.clone(),
                    output_dir: "/out/png".into(),
                    metadata: "-lpng".into(),
                    direct: true,
                },
            ],
        };

        assert_eq!(ctx.install_dir_of(&zlib), Some(Path::new("/out/zlib")));
        assert_eq!(ctx.metadata_of(&png), Some("-lpng"));
        assert_eq!(ctx.install_dir_of(&ModuleRef::new("x/x", "1")), None);
        assert_eq!(ctx.direct_deps().count(), 1);
    }
}
