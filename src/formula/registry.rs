//! Explicit formula registry
//!
//! Built once per invocation and handed to the resolver and scheduler, so
//! independent resolutions (tests included) never share state.

use super::Formula;
use crate::module::ModuleRef;
use crate::version::{ComparatorRegistry, VersionComparator};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Formulas by module path, plus each path's version comparator
#[derive(Default, Clone)]
pub struct FormulaRegistry {
    formulas: HashMap<String, Vec<Arc<dyn Formula>>>,
    comparators: ComparatorRegistry,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formula under its own path
    pub fn register(&mut self, formula: Arc<dyn Formula>) {
        debug!(path = formula.path(), from_ver = formula.from_ver(), "Registering formula");
        self.formulas
            .entry(formula.path().to_string())
            .or_default()
            .push(formula);
    }

    /// Override the version comparator for one module path
    pub fn register_comparator(
        &mut self,
        path: impl Into<String>,
        comparator: Arc<dyn VersionComparator>,
    ) {
        self.comparators.register(path, comparator);
    }

    pub fn comparators(&self) -> &ComparatorRegistry {
        &self.comparators
    }

    pub fn comparator(&self, path: &str) -> &dyn VersionComparator {
        self.comparators.for_path(path)
    }

    /// Pick the formula for `module`: among those whose `from_ver` the
    /// requested version satisfies, the one with the greatest `from_ver`.
    ///
    /// Equal `from_ver` values keep the formula registered first.
    pub fn select(&self, module: &ModuleRef) -> Option<Arc<dyn Formula>> {
        let cmp = self.comparator(&module.path);
        let mut best: Option<&Arc<dyn Formula>> = None;

        for formula in self.formulas.get(&module.path)? {
            if !cmp.satisfies(&module.version, formula.from_ver()) {
                continue;
            }
            best = match best {
                Some(b) if cmp.compare(formula.from_ver(), b.from_ver()) != Ordering::Greater => {
                    Some(b)
                }
                _ => Some(formula),
            };
        }

        best.cloned()
    }

    /// Registered module paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.formulas.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.formulas.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}
