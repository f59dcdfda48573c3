//! Build outcomes

use crate::module::ModuleRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why a (module, variant) build did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildError {
    /// A dependency's result for the same variant contains errors
    DependencyFailed { dependency: ModuleRef },

    /// Recorded by the build hook itself (toolchain failure, missing output, ...)
    Hook { message: String },

    /// The hook did not finish within the configured limit
    Timeout { secs: u64 },

    /// The hook panicked
    Panicked { message: String },
}

impl BuildError {
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::DependencyFailed { .. })
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyFailed { dependency } => write!(f, "dependency {} failed", dependency),
            Self::Hook { message } => f.write_str(message),
            Self::Timeout { secs } => write!(f, "build hook timed out after {}s", secs),
            Self::Panicked { message } => write!(f, "build hook panicked: {}", message),
        }
    }
}

/// Outcome of one (module, variant) build.
///
/// `errs` is non-empty iff the build failed. `metadata` carries opaque
/// compiler/linker flags (e.g. `-lz`) that dependents need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub errs: Vec<BuildError>,
}

impl BuildResult {
    /// A fresh result for a hook to fill in
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            metadata: String::new(),
            errs: Vec::new(),
        }
    }

    /// Result synthesized for a node whose dependency failed
    pub fn dependency_failed(output_dir: PathBuf, dependency: ModuleRef) -> Self {
        Self {
            output_dir,
            metadata: String::new(),
            errs: vec![BuildError::DependencyFailed { dependency }],
        }
    }

    pub fn add_err(&mut self, err: BuildError) {
        self.errs.push(err);
    }

    pub fn is_ok(&self) -> bool {
        self.errs.is_empty()
    }

    pub fn is_failed(&self) -> bool {
        !self.errs.is_empty()
    }

    /// True when the only reason for failure is an upstream failure
    pub fn is_dependency_failed(&self) -> bool {
        !self.errs.is_empty() && self.errs.iter().all(BuildError::is_dependency_failure)
    }
}
