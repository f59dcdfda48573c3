//! Configuration schema for kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`; a project may
//! override any key in a `.kiln.toml` found in the working directory or one
//! of its parents.

use crate::error::KilnResult;
use crate::module::MatrixVariant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Where formulas, sources and install trees live
    pub paths: PathsConfig,

    /// Scheduler defaults
    pub build: BuildConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append run events to the build journal
    pub journal: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            journal: true,
        }
    }
}

/// Filesystem layout. Relative paths are taken from the directory of the
/// project config, or the working directory when there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Formula files, `<owner>/<repo>/*.toml`
    pub formulas_dir: PathBuf,

    /// Checked-out sources, `<owner>/<repo>/<version>/`
    pub sources_dir: PathBuf,

    /// Install trees, `<owner>/<repo>/<version>/<variant>/`
    pub install_root: PathBuf,

    /// Static dependency manifest
    pub manifest: PathBuf,

    /// Build scratch space, `<owner>/<repo>/<version>/<variant>/`
    pub build_dir: PathBuf,

    /// Journal and persisted results (default: platform state dir)
    pub state_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            formulas_dir: PathBuf::from("formulas"),
            sources_dir: PathBuf::from("sources"),
            install_root: PathBuf::from("install"),
            manifest: PathBuf::from("manifest.toml"),
            build_dir: PathBuf::from("build"),
            state_dir: None,
        }
    }
}

impl PathsConfig {
    /// Make every relative path absolute against `base`
    pub fn anchor(&mut self, base: &Path) {
        for path in [
            &mut self.formulas_dir,
            &mut self.sources_dir,
            &mut self.install_root,
            &mut self.manifest,
            &mut self.build_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(state) = self.state_dir.as_mut() {
            if state.is_relative() {
                *state = base.join(&*state);
            }
        }
    }
}

/// Scheduler defaults, overridable per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Concurrent build hooks (default: available CPUs)
    pub jobs: Option<usize>,

    /// Matrix variants to build (default: the host)
    pub matrix: Vec<String>,

    /// Keep successful results between runs
    pub persist_cache: bool,

    /// Per-hook time limit in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            matrix: Vec::new(),
            persist_cache: true,
            timeout_secs: None,
        }
    }
}

impl BuildConfig {
    pub fn jobs(&self) -> usize {
        self.jobs
            .filter(|n| *n > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Configured variants, or the host variant when none are set
    pub fn variants(&self) -> KilnResult<Vec<MatrixVariant>> {
        if self.matrix.is_empty() {
            return Ok(vec![MatrixVariant::host()]);
        }
        self.matrix.iter().map(|v| MatrixVariant::parse(v)).collect()
    }
}
