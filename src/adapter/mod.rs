//! Build-tool adapters
//!
//! Thin wrappers around external toolchains that build hooks drive through
//! the [`BuildTool`] interface. The engine itself never calls these; they are
//! consumed by formulas (see `formula::file`). Commands run synchronously
//! because build hooks already execute on a blocking worker thread.

mod autotools;
mod cmake;

pub use autotools::ConfigureMake;
pub use cmake::CMake;

use crate::error::{KilnError, KilnResult};
use crate::module::MatrixVariant;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Max number of output lines to include in tool error messages.
const TOOL_ERROR_TAIL_LINES: usize = 50;

/// Uniform interface over configure/build/install style toolchains
pub trait BuildTool {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Make a dependency's headers, libraries and package files visible
    fn use_dep(&mut self, install_dir: &Path);

    fn configure(&mut self) -> KilnResult<()>;

    fn build(&mut self) -> KilnResult<()>;

    fn install(&mut self) -> KilnResult<()>;
}

/// Which adapter a formula asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// `./configure && make && make install`
    Configure,
    /// `cmake -S -B`, `cmake --build`, `cmake --install`
    Cmake,
}

impl ToolKind {
    /// Instantiate the adapter for one build
    pub fn create(self, env: ToolEnv) -> Box<dyn BuildTool> {
        match self {
            Self::Configure => Box::new(ConfigureMake::new(env)),
            Self::Cmake => Box::new(CMake::new(env)),
        }
    }
}

/// Directories, flags and environment shared by every adapter
#[derive(Debug, Clone)]
pub struct ToolEnv {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub prefix: PathBuf,
    pub variant: MatrixVariant,
    pub jobs: usize,
    /// Extra arguments for the configure step
    pub args: Vec<String>,
    /// Extra environment variables for every step
    pub env: BTreeMap<String, String>,
    /// Install prefixes of dependencies, in the order they were added
    pub dep_prefixes: Vec<PathBuf>,
}

impl ToolEnv {
    pub fn new(source_dir: PathBuf, build_dir: PathBuf, prefix: PathBuf, variant: MatrixVariant) -> Self {
        Self {
            source_dir,
            build_dir,
            prefix,
            variant,
            jobs: 1,
            args: Vec::new(),
            env: BTreeMap::new(),
            dep_prefixes: Vec::new(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn add_dep(&mut self, install_dir: &Path) {
        if !self.dep_prefixes.iter().any(|p| p == install_dir) {
            self.dep_prefixes.push(install_dir.to_path_buf());
        }
    }

    /// Base command with the variant exported and the tool's env applied
    fn command(&self, program: &str, cwd: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(cwd)
            .env("KILN_MATRIX", self.variant.as_str())
            .env("KILN_ARCH", self.variant.arch())
            .env("KILN_OS", self.variant.os())
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn ensure_build_dir(&self) -> KilnResult<()> {
        std::fs::create_dir_all(&self.build_dir).map_err(|e| {
            KilnError::io(format!("creating build directory {}", self.build_dir.display()), e)
        })
    }
}

/// Join paths with the platform's search-path separator
fn join_search_path<I, P>(paths: I) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    std::env::join_paths(paths.into_iter().map(|p| p.as_ref().to_path_buf()))
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Run a tool step, turning a non-zero exit into [`KilnError::ToolFailed`].
fn run_step(tool: &str, step: &str, mut cmd: Command) -> KilnResult<()> {
    debug!(tool, step, command = ?cmd, "Running build step");

    let output = cmd
        .output()
        .map_err(|e| KilnError::command_failed(format!("{:?}", cmd.get_program()), e))?;

    if output.status.success() {
        return Ok(());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(KilnError::ToolFailed {
        tool: tool.to_string(),
        step: step.to_string(),
        output: tool_error_output(&stdout, &stderr),
    })
}

/// Extract the useful tail of tool output for error diagnostics.
pub(crate) fn tool_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail = if total > TOOL_ERROR_TAIL_LINES {
        &lines[total - TOOL_ERROR_TAIL_LINES..]
    } else {
        &lines[..]
    };
    tail.join("\n")
}
