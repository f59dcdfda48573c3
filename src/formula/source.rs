//! Read access to a module's source tree at a tagged version

use crate::error::{KilnError, KilnResult};
use crate::module::ModuleRef;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Files of one module at one version
pub trait SourceTree {
    /// Read a file relative to the tree root
    fn read_to_string(&self, rel: &str) -> KilnResult<String>;

    fn exists(&self, rel: &str) -> bool;
}

/// Opens source trees and lists known versions
pub trait SourceProvider: Send + Sync {
    fn open(&self, module: &ModuleRef) -> KilnResult<Box<dyn SourceTree + '_>>;

    /// Versions available for `path`, in no particular order
    fn versions(&self, path: &str) -> Vec<String>;
}

/// Reject absolute paths and `..` so hooks cannot escape the tree.
fn validate_relative(rel: &str) -> KilnResult<&Path> {
    let path = Path::new(rel);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if rel.is_empty() || escapes {
        return Err(KilnError::User(format!(
            "Invalid source path '{}': must be relative and stay inside the tree",
            rel
        )));
    }
    Ok(path)
}

/// Source trees checked out as `<root>/<owner>/<repo>/<version>/`
#[derive(Debug, Clone)]
pub struct DirSourceProvider {
    root: PathBuf,
}

impl DirSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn tree_dir(&self, module: &ModuleRef) -> PathBuf {
        self.root.join(&module.path).join(&module.version)
    }
}

struct DirSourceTree {
    dir: PathBuf,
}

impl SourceTree for DirSourceTree {
    fn read_to_string(&self, rel: &str) -> KilnResult<String> {
        let path = self.dir.join(validate_relative(rel)?);
        std::fs::read_to_string(&path)
            .map_err(|e| KilnError::io(format!("reading {}", path.display()), e))
    }

    fn exists(&self, rel: &str) -> bool {
        validate_relative(rel).is_ok_and(|p| self.dir.join(p).exists())
    }
}

impl SourceProvider for DirSourceProvider {
    fn open(&self, module: &ModuleRef) -> KilnResult<Box<dyn SourceTree + '_>> {
        let dir = self.tree_dir(module);
        if !dir.is_dir() {
            return Err(KilnError::io(
                format!("opening source tree {}", dir.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(Box::new(DirSourceTree { dir }))
    }

    fn versions(&self, path: &str) -> Vec<String> {
        let entries = match std::fs::read_dir(self.root.join(path)) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect()
    }
}

/// In-memory source trees, mainly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    trees: HashMap<ModuleRef, HashMap<String, String>>,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file in a module's tree, creating the tree
    pub fn insert(&mut self, module: ModuleRef, rel: impl Into<String>, content: impl Into<String>) {
        self.trees
            .entry(module)
            .or_default()
            .insert(rel.into(), content.into());
    }

    /// Create an empty tree so the version is known
    pub fn add_tree(&mut self, module: ModuleRef) {
        self.trees.entry(module).or_default();
    }
}

struct MemorySourceTree<'a> {
    module: &'a ModuleRef,
    files: &'a HashMap<String, String>,
}

impl SourceTree for MemorySourceTree<'_> {
    fn read_to_string(&self, rel: &str) -> KilnResult<String> {
        validate_relative(rel)?;
        self.files.get(rel).cloned().ok_or_else(|| {
            KilnError::io(
                format!("reading {} in {}", rel, self.module),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })
    }

    fn exists(&self, rel: &str) -> bool {
        self.files.contains_key(rel)
    }
}

impl SourceProvider for MemorySourceProvider {
    fn open(&self, module: &ModuleRef) -> KilnResult<Box<dyn SourceTree + '_>> {
        let (module, files) = self.trees.get_key_value(module).ok_or_else(|| {
            KilnError::io(
                format!("opening source tree {}", module),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })?;
        Ok(Box::new(MemorySourceTree { module, files }))
    }

    fn versions(&self, path: &str) -> Vec<String> {
        self.trees
            .keys()
            .filter(|m| m.path == path)
            .map(|m| m.version.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn validate_relative_rejects_escape() {
        assert!(validate_relative("../x").is_err());
        assert!(validate_relative("a/../../x").is_err());
        assert!(validate_relative("/etc/passwd").is_err());
        assert!(validate_relative("").is_err());
        assert!(validate_relative("CMakeLists.txt").is_ok());
        assert!(validate_relative("./build/deps.txt").is_ok());
    }

    #[test]
    fn dir_provider_reads_tree() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("madler").join("zlib").join("1.3.1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("deps.txt"), "a/b 1.0\n").unwrap();
        std::fs::create_dir_all(temp.path().join("madler/zlib/1.2.13")).unwrap();

        let provider = DirSourceProvider::new(temp.path());
        let tree = provider.open(&ModuleRef::new("madler/zlib", "1.3.1")).unwrap();
        assert_eq!(tree.read_to_string("deps.txt").unwrap(), "a/b 1.0\n");
        assert!(tree.exists("deps.txt"));
        assert!(!tree.exists("../1.2.13"));

        let mut versions = provider.versions("madler/zlib");
        versions.sort();
        assert_eq!(versions, vec!["1.2.13", "1.3.1"]);
    }

    #[test]
    fn dir_provider_missing_tree() {
        let temp = TempDir::new().unwrap();
        let provider = DirSourceProvider::new(temp.path());
        assert!(provider.open(&ModuleRef::new("no/such", "1")).is_err());
        assert!(provider.versions("no/such").is_empty());
    }

    #[test]
    fn memory_provider() {
        let mut provider = MemorySourceProvider::new();
        let m = ModuleRef::new("x/x", "1.0");
        provider.insert(m.clone(), "deps.txt", "y/y 2\n");
        provider.add_tree(ModuleRef::new("x/x", "2.0"));

        let tree = provider.open(&m).unwrap();
        assert_eq!(tree.read_to_string("deps.txt").unwrap(), "y/y 2\n");
        assert!(tree.read_to_string("missing").is_err());
        assert_eq!(provider.versions("x/x").len(), 2);
    }
}
