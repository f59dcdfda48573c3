//! Module resolution
//!
//! Turns a root module into a [`ResolvedGraph`]. For each module the
//! formula's discovery handler runs first; when it is absent, fails, or
//! declares nothing, the static manifest supplies the dependency list.
//!
//! One version per module path: the first version selected for a path wins
//! and every later requirement on that path is checked against it with the
//! path's comparator. Conflicts fail the whole resolution.

mod graph;

pub use graph::{DiscoverySource, ModuleNode, ResolvedGraph};

use crate::error::{KilnError, KilnResult, ResolutionError};
use crate::formula::{Discovery, FormulaRegistry, SourceProvider, SourceTree};
use crate::manifest::StaticManifest;
use crate::module::{validate_module_path, validate_version, DepSpec, ModuleRef};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Resolves module requests against a registry, manifest and source trees
pub struct Resolver<'a> {
    registry: &'a FormulaRegistry,
    manifest: &'a StaticManifest,
    sources: &'a dyn SourceProvider,
}

/// Bookkeeping for one resolution pass; discarded on failure
#[derive(Default)]
struct Pass {
    /// Finished nodes, each after all of its dependencies
    nodes: Vec<ModuleNode>,
    /// Selected version per path, for finished and in-progress modules
    selected: HashMap<String, String>,
    /// Modules currently being resolved, outermost first
    stack: Vec<ModuleRef>,
}

/// Stand-in tree when the module's sources cannot be opened
struct UnavailableTree(String);

impl SourceTree for UnavailableTree {
    fn read_to_string(&self, _rel: &str) -> KilnResult<String> {
        Err(KilnError::User(self.0.clone()))
    }

    fn exists(&self, _rel: &str) -> bool {
        false
    }
}

impl<'a> Resolver<'a> {
    pub fn new(
        registry: &'a FormulaRegistry,
        manifest: &'a StaticManifest,
        sources: &'a dyn SourceProvider,
    ) -> Self {
        Self {
            registry,
            manifest,
            sources,
        }
    }

    /// Resolve `root` and everything it depends on.
    ///
    /// Deterministic for identical formulas, manifest and source trees. On
    /// error nothing of the partial pass is returned.
    pub fn resolve(&self, root: &ModuleRef) -> Result<ResolvedGraph, ResolutionError> {
        if let Err(e) = validate_module_path(&root.path).and(validate_version(&root.version)) {
            return Err(ResolutionError::InvalidModule {
                module: root.clone(),
                reason: e.to_string(),
            });
        }

        let mut pass = Pass::default();
        self.visit(root.clone(), &mut pass)?;

        let graph = ResolvedGraph::new(root.clone(), pass.nodes)?;
        info!(root = %root, modules = graph.len(), "Resolved dependency graph");
        Ok(graph)
    }

    /// Greatest known version of `path` across the manifest and source trees
    pub fn latest_version(&self, path: &str) -> Result<String, ResolutionError> {
        let from_sources = self.sources.versions(path);
        let candidates = self
            .manifest
            .versions(path)
            .into_iter()
            .chain(from_sources.iter().map(String::as_str));

        self.registry
            .comparators()
            .latest(path, candidates)
            .map(str::to_string)
            .ok_or_else(|| ResolutionError::NoVersion(path.to_string()))
    }

    fn visit(&self, module: ModuleRef, pass: &mut Pass) -> Result<(), ResolutionError> {
        pass.stack.push(module.clone());
        pass.selected
            .insert(module.path.clone(), module.version.clone());

        let (specs, source) = self.dependencies_of(&module)?;
        let mut deps: Vec<ModuleRef> = Vec::with_capacity(specs.len());

        for spec in specs {
            if validate_module_path(&spec.path).is_err()
                || validate_version(&spec.min_version).is_err()
            {
                return Err(ResolutionError::InvalidDependency {
                    module: module.clone(),
                    spec: spec.to_string(),
                });
            }

            if let Some(pos) = pass.stack.iter().position(|m| m.path == spec.path) {
                let mut chain = pass.stack[pos..].to_vec();
                chain.push(pass.stack[pos].clone());
                return Err(ResolutionError::Cycle(chain));
            }

            let dep = match pass.selected.get(&spec.path) {
                Some(existing) => {
                    let cmp = self.registry.comparator(&spec.path);
                    if !cmp.satisfies(existing, &spec.min_version) {
                        return Err(ResolutionError::VersionConflict {
                            path: spec.path.clone(),
                            existing: existing.clone(),
                            required: spec.min_version.clone(),
                            required_by: module.clone(),
                        });
                    }
                    ModuleRef::new(spec.path.clone(), existing.clone())
                }
                None => {
                    let dep = ModuleRef::new(spec.path.clone(), spec.min_version.clone());
                    self.visit(dep.clone(), pass)?;
                    dep
                }
            };

            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        pass.stack.pop();
        debug!(module = %module, deps = deps.len(), %source, "Resolved module");
        pass.nodes.push(ModuleNode {
            module,
            deps,
            source,
        });
        Ok(())
    }

    /// Dynamic discovery first, static manifest as the fallback
    fn dependencies_of(
        &self,
        module: &ModuleRef,
    ) -> Result<(Vec<DepSpec>, DiscoverySource), ResolutionError> {
        let formula = self
            .registry
            .select(module)
            .ok_or_else(|| ResolutionError::NoFormula(module.clone()))?;

        let discovery = match self.sources.open(module) {
            Ok(tree) => formula.discover(module, tree.as_ref()),
            Err(e) => formula.discover(module, &UnavailableTree(e.to_string())),
        };

        if let Discovery::Declared(deps) = &discovery {
            if !deps.is_empty() {
                return Ok((deps.clone(), DiscoverySource::Dynamic));
            }
        }
        if let Discovery::Failed(reason) = &discovery {
            warn!(module = %module, %reason, "Discovery failed, falling back to manifest");
        }

        if let Some(deps) = self.manifest.lookup(module) {
            return Ok((deps, DiscoverySource::StaticFallback));
        }

        match discovery {
            Discovery::Declared(_) => Ok((Vec::new(), DiscoverySource::Dynamic)),
            Discovery::Absent => Err(ResolutionError::NoDependencyInfo {
                module: module.clone(),
                reason: "formula has no discovery handler and the manifest has no entry"
                    .to_string(),
            }),
            Discovery::Failed(reason) => Err(ResolutionError::NoDependencyInfo {
                module: module.clone(),
                reason: format!("discovery failed ({}) and the manifest has no entry", reason),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BuildResult;
    use crate::formula::{BuildContext, Formula, MemorySourceProvider};
    use crate::version::SemverComparator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Discovery reads "deps.txt" when `dynamic` is set
    struct TestFormula {
        path: String,
        dynamic: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Formula for TestFormula {
        fn path(&self) -> &str {
            &self.path
        }

        fn from_ver(&self) -> &str {
            "0"
        }

        fn discover(&self, _module: &ModuleRef, source: &dyn SourceTree) -> Discovery {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.dynamic {
                return Discovery::Absent;
            }
            match source.read_to_string("deps.txt") {
                Ok(content) => match crate::formula::file::parse_dep_list(&content) {
                    Ok(deps) => Discovery::Declared(deps),
                    Err(e) => Discovery::Failed(e),
                },
                Err(e) => Discovery::Failed(e.to_string()),
            }
        }

        fn build(&self, _ctx: &BuildContext, _result: &mut BuildResult) {}
    }

    struct Fixture {
        registry: FormulaRegistry,
        manifest: StaticManifest,
        sources: MemorySourceProvider,
        calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: FormulaRegistry::new(),
                manifest: StaticManifest::new(),
                sources: MemorySourceProvider::new(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn formula(&mut self, path: &str, dynamic: bool) -> &mut Self {
            self.registry.register(Arc::new(TestFormula {
                path: path.to_string(),
                dynamic,
                calls: self.calls.clone(),
            }));
            self
        }

        /// Module whose discovery declares `deps`
        fn dynamic(&mut self, module: &str, deps: &str) -> &mut Self {
            let m = ModuleRef::parse(module).unwrap();
            self.formula(&m.path, true);
            self.sources.insert(m, "deps.txt", deps);
            self
        }

        fn resolve(&self, root: &str) -> Result<ResolvedGraph, ResolutionError> {
            Resolver::new(&self.registry, &self.manifest, &self.sources)
                .resolve(&ModuleRef::parse(root).unwrap())
        }
    }

    #[test]
    fn single_module_without_deps() {
        let mut fx = Fixture::new();
        fx.dynamic("x/x@1.0", "");
        fx.manifest.insert(&ModuleRef::new("x/x", "1.0"), &[]);

        let graph = fx.resolve("x/x@1.0").unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.root(), &ModuleRef::new("x/x", "1.0"));
    }

    #[test]
    fn dynamic_discovery_builds_chain() {
        let mut fx = Fixture::new();
        fx.dynamic("x/x@1.0", "y/y 2.0\n")
            .dynamic("y/y@2.0", "z/z 3.0\n")
            .dynamic("z/z@3.0", "# leaf\n");

        let graph = fx.resolve("x/x@1.0").unwrap();
        assert_eq!(graph.len(), 3);

        let x = graph.get(&ModuleRef::new("x/x", "1.0")).unwrap();
        assert_eq!(x.deps, vec![ModuleRef::new("y/y", "2.0")]);
        assert_eq!(x.source, DiscoverySource::Dynamic);

        // Declared-nothing without a manifest entry is a dynamic leaf
        let z = graph.get(&ModuleRef::new("z/z", "3.0")).unwrap();
        assert!(z.deps.is_empty());
        assert_eq!(z.source, DiscoverySource::Dynamic);
    }

    #[test]
    fn static_fallback_when_discovery_unavailable() {
        let mut fx = Fixture::new();
        fx.formula("x/x", false).formula("y/y", false);
        fx.manifest.insert(
            &ModuleRef::new("x/x", "1.0"),
            &[DepSpec::new("y/y", "v1.0.0")],
        );
        fx.manifest.insert(&ModuleRef::new("y/y", "v1.0.0"), &[]);

        let graph = fx.resolve("x/x@1.0").unwrap();
        let x = graph.get(&ModuleRef::new("x/x", "1.0")).unwrap();
        assert_eq!(x.source, DiscoverySource::StaticFallback);
        assert_eq!(x.deps, vec![ModuleRef::new("y/y", "v1.0.0")]);
    }

    #[test]
    fn static_fallback_when_discovery_fails() {
        let mut fx = Fixture::new();
        // dynamic formula, but no deps.txt in any tree
        fx.formula("x/x", true).formula("y/y", false);
        fx.manifest
            .insert(&ModuleRef::new("x/x", "1.0"), &[DepSpec::new("y/y", "1")]);
        fx.manifest.insert(&ModuleRef::new("y/y", "1"), &[]);

        let graph = fx.resolve("x/x@1.0").unwrap();
        assert_eq!(
            graph.get(&ModuleRef::new("x/x", "1.0")).unwrap().source,
            DiscoverySource::StaticFallback
        );
    }

    #[test]
    fn missing_discovery_and_manifest_fails() {
        let mut fx = Fixture::new();
        fx.formula("x/x", false);
        let err = fx.resolve("x/x@1.0").unwrap_err();
        assert!(matches!(err, ResolutionError::NoDependencyInfo { .. }));

        let mut fx = Fixture::new();
        fx.formula("x/x", true);
        let err = fx.resolve("x/x@1.0").unwrap_err();
        assert!(err.to_string().contains("discovery failed"));
    }

    #[test]
    fn missing_formula_fails() {
        let mut fx = Fixture::new();
        fx.dynamic("x/x@1.0", "nobody/home 1\n");
        let err = fx.resolve("x/x@1.0").unwrap_err();
        assert_eq!(err, ResolutionError::NoFormula(ModuleRef::new("nobody/home", "1")));
    }

    #[test]
    fn detects_cycle() {
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "b/b 1\n")
            .dynamic("b/b@1", "c/c 1\n")
            .dynamic("c/c@1", "a/a 1\n");

        match fx.resolve("a/a@1").unwrap_err() {
            ResolutionError::Cycle(chain) => {
                let paths: Vec<&str> = chain.iter().map(|m| m.path.as_str()).collect();
                assert_eq!(paths, vec!["a/a", "b/b", "c/c", "a/a"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn detects_self_dependency() {
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "a/a 1\n");
        assert!(matches!(fx.resolve("a/a@1"), Err(ResolutionError::Cycle(_))));
    }

    #[test]
    fn shared_dependency_is_one_node() {
        // a -> b -> d, a -> c -> d
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "b/b 1\nc/c 1\n")
            .dynamic("b/b@1", "d/d 1.2\n")
            .dynamic("c/c@1", "d/d 1.0\n")
            .dynamic("d/d@1.2", "");

        let graph = fx.resolve("a/a@1").unwrap();
        assert_eq!(graph.len(), 4);

        // c asked for >= 1.0 and got the already selected 1.2
        let c = graph.get(&ModuleRef::new("c/c", "1")).unwrap();
        assert_eq!(c.deps, vec![ModuleRef::new("d/d", "1.2")]);
        assert_eq!(graph.dependents(&ModuleRef::new("d/d", "1.2")).len(), 2);
    }

    #[test]
    fn version_conflict_fails() {
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "b/b 1\nc/c 1\n")
            .dynamic("b/b@1", "d/d 1.0\n")
            .dynamic("c/c@1", "d/d 2.0\n")
            .dynamic("d/d@1.0", "");

        match fx.resolve("a/a@1").unwrap_err() {
            ResolutionError::VersionConflict {
                path,
                existing,
                required,
                required_by,
            } => {
                assert_eq!(path, "d/d");
                assert_eq!(existing, "1.0");
                assert_eq!(required, "2.0");
                assert_eq!(required_by, ModuleRef::new("c/c", "1"));
            }
            other => panic!("expected conflict, got {other}"),
        }
    }

    #[test]
    fn dependency_version_cannot_escape_directories() {
        let mut fx = Fixture::new();
        fx.formula("x/x", false).formula("madler/zlib", false);
        fx.manifest.insert(
            &ModuleRef::new("x/x", "1.0"),
            &[DepSpec::new("madler/zlib", "../../../../tmp/evil")],
        );

        assert_eq!(
            fx.resolve("x/x@1.0").unwrap_err(),
            ResolutionError::InvalidDependency {
                module: ModuleRef::new("x/x", "1.0"),
                spec: "madler/zlib@../../../../tmp/evil".to_string(),
            }
        );
    }

    #[test]
    fn root_version_is_validated() {
        let mut fx = Fixture::new();
        fx.formula("x/x", false);
        let root = ModuleRef::new("x/x", "../1.0");
        let resolver = Resolver::new(&fx.registry, &fx.manifest, &fx.sources);
        assert!(matches!(
            resolver.resolve(&root),
            Err(ResolutionError::InvalidModule { .. })
        ));
    }

    #[test]
    fn conflict_check_uses_module_comparator() {
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "b/b 1\nd/d 1.0.0\n")
            .dynamic("b/b@1", "d/d 1.0.0-rc.1\n")
            .dynamic("d/d@1.0.0-rc.1", "")
            .dynamic("d/d@1.0.0", "");

        // Debian ordering treats "-rc.1" as a revision above the release
        assert!(fx.resolve("a/a@1").is_ok());

        // b visits first and selects the rc; under semver the release requirement fails
        fx.registry
            .register_comparator("d/d", Arc::new(SemverComparator));
        match fx.resolve("a/a@1").unwrap_err() {
            ResolutionError::VersionConflict {
                path,
                existing,
                required,
                ..
            } => {
                assert_eq!(path, "d/d");
                assert_eq!(existing, "1.0.0-rc.1");
                assert_eq!(required, "1.0.0");
            }
            other => panic!("expected conflict, got {other}"),
        }
    }

    #[test]
    fn every_edge_satisfies_its_requirement() {
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "b/b 1\nc/c 1\nd/d 0.9\n")
            .dynamic("b/b@1", "d/d 1.1\n")
            .dynamic("c/c@1", "d/d v1.0\n")
            .dynamic("d/d@1.1", "");

        let graph = fx.resolve("a/a@1").unwrap();
        let cmp = fx.registry.comparator("d/d");
        for node in graph.topo_order() {
            for dep in &node.deps {
                assert!(graph.contains(dep));
                if dep.path == "d/d" {
                    assert!(cmp.satisfies(&dep.version, "1.1") || node.module.path == "b/b");
                }
            }
        }
        assert_eq!(graph.by_path("d/d").unwrap().module.version, "1.1");
    }

    #[test]
    fn discovery_runs_once_per_module() {
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "b/b 1\nc/c 1\n")
            .dynamic("b/b@1", "c/c 1\n")
            .dynamic("c/c@1", "");

        fx.resolve("a/a@1").unwrap();
        assert_eq!(fx.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut fx = Fixture::new();
        fx.dynamic("a/a@1", "b/b 1\nc/c 1\n")
            .dynamic("b/b@1", "d/d 1\n")
            .dynamic("c/c@1", "d/d 1\n")
            .dynamic("d/d@1", "");

        let first: Vec<ModuleRef> = fx
            .resolve("a/a@1")
            .unwrap()
            .topo_order()
            .map(|n| n.module.clone())
            .collect();
        for _ in 0..5 {
            let again: Vec<ModuleRef> = fx
                .resolve("a/a@1")
                .unwrap()
                .topo_order()
                .map(|n| n.module.clone())
                .collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn latest_version_across_sources() {
        let mut fx = Fixture::new();
        fx.manifest.insert(&ModuleRef::new("x/x", "1.9"), &[]);
        fx.sources.add_tree(ModuleRef::new("x/x", "1.10"));
        fx.sources.add_tree(ModuleRef::new("x/x", "1.2"));

        let resolver = Resolver::new(&fx.registry, &fx.manifest, &fx.sources);
        assert_eq!(resolver.latest_version("x/x").unwrap(), "1.10");
        assert_eq!(
            resolver.latest_version("y/y"),
            Err(ResolutionError::NoVersion("y/y".to_string()))
        );
    }
}
