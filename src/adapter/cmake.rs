//! CMake adapter

use super::{run_step, BuildTool, ToolEnv};
use crate::error::KilnResult;
use std::path::Path;

/// Cache-based generator builds driven through the `cmake` CLI
pub struct CMake {
    env: ToolEnv,
}

impl CMake {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }

    /// `CMAKE_PREFIX_PATH` uses ';' on every platform
    fn prefix_path(&self) -> String {
        self.env
            .dep_prefixes
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    fn configure_args(&self) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.env.source_dir.display().to_string(),
            "-B".to_string(),
            self.env.build_dir.display().to_string(),
            format!("-DCMAKE_INSTALL_PREFIX={}", self.env.prefix.display()),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
        ];
        if !self.env.dep_prefixes.is_empty() {
            args.push(format!("-DCMAKE_PREFIX_PATH={}", self.prefix_path()));
        }
        args.extend(self.env.args.iter().cloned());
        args
    }
}

impl BuildTool for CMake {
    fn name(&self) -> &'static str {
        "cmake"
    }

    fn use_dep(&mut self, install_dir: &Path) {
        self.env.add_dep(install_dir);
    }

    fn configure(&mut self) -> KilnResult<()> {
        self.env.ensure_build_dir()?;
        let mut cmd = self.env.command("cmake", &self.env.build_dir);
        cmd.args(self.configure_args());
        run_step(self.name(), "configure", cmd)
    }

    fn build(&mut self) -> KilnResult<()> {
        let mut cmd = self.env.command("cmake", &self.env.build_dir);
        cmd.arg("--build")
            .arg(&self.env.build_dir)
            .arg("--parallel")
            .arg(self.env.jobs.to_string());
        run_step(self.name(), "build", cmd)
    }

    fn install(&mut self) -> KilnResult<()> {
        let mut cmd = self.env.command("cmake", &self.env.build_dir);
        cmd.arg("--install").arg(&self.env.build_dir);
        run_step(self.name(), "install", cmd)
    }
}
