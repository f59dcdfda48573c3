//! Error types for kiln
//!
//! All modules use `KilnResult<T>` as their return type. Build failures are
//! not errors at this level: they are recorded as [`BuildError`] values inside
//! a `BuildResult` so that one broken module never aborts the rest of a run.
//!
//! [`BuildError`]: crate::cache::BuildError

use crate::module::{CacheKey, ModuleRef};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// Failures that abort dependency resolution before any build hook runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<ModuleRef>),

    #[error("version conflict on {path}: {existing} is selected but {required_by} requires >= {required}")]
    VersionConflict {
        path: String,
        existing: String,
        required: String,
        required_by: ModuleRef,
    },

    #[error("no formula for {0}")]
    NoFormula(ModuleRef),

    #[error("no dependency information for {module}: {reason}")]
    NoDependencyInfo { module: ModuleRef, reason: String },

    #[error("no version of {0} found in the manifest or source tree")]
    NoVersion(String),

    #[error("invalid dependency declaration '{spec}' in {module}")]
    InvalidDependency { module: ModuleRef, spec: String },

    #[error("invalid module {module}: {reason}")]
    InvalidModule { module: ModuleRef, reason: String },

    #[error("{module} depends on {dependency}, which has no node in the graph")]
    DanglingEdge {
        module: ModuleRef,
        dependency: ModuleRef,
    },
}

fn format_cycle(chain: &[ModuleRef]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// All errors that can occur in kiln
#[derive(Error, Debug)]
pub enum KilnError {
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    // Build outcome errors
    #[error("{failed} of {total} builds failed")]
    BuildFailed { failed: usize, total: usize },

    #[error("build cancelled, {skipped} units not started")]
    Cancelled { skipped: usize },

    // Cache errors
    #[error("result already recorded for {0}")]
    DuplicateResult(CacheKey),

    #[error("failed to read cached result {path}: {reason}")]
    CacheEntryInvalid { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Descriptor errors
    #[error("Invalid formula {path}: {reason}")]
    FormulaInvalid { path: PathBuf, reason: String },

    #[error("Invalid manifest {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Invalid module path '{path}': {reason}")]
    ModulePathInvalid { path: String, reason: String },

    #[error("Invalid version '{version}': {reason}")]
    VersionInvalid { version: String, reason: String },

    #[error("Invalid matrix variant '{0}'")]
    VariantInvalid(String),

    // Build tool errors
    #[error("{tool} {step} failed: {output}")]
    ToolFailed {
        tool: String,
        step: String,
        output: String,
    },

    #[error("Failed to launch {command}: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command launch error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether this error came out of dependency resolution
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Resolution(ResolutionError::NoFormula(_)) => {
                Some("Add a formula.toml under the configured formulas_dir")
            }
            Self::Resolution(ResolutionError::NoDependencyInfo { .. }) => {
                Some("Add an entry for this version to the static manifest")
            }
            Self::Resolution(ResolutionError::NoVersion(_)) => Some("Pass --version explicitly"),
            Self::Resolution(ResolutionError::VersionConflict { .. }) => {
                Some("Only one version per module path can be built in a single run")
            }
            Self::BuildFailed { .. } => Some("Fix the failing modules and re-run; successful builds are reused"),
            Self::ConfigInvalid { .. } => Some("Run: kiln config show"),
            _ => None,
        }
    }
}
