//! configure/make style adapter

use super::{join_search_path, run_step, BuildTool, ToolEnv};
use crate::error::KilnResult;
use std::path::Path;

/// Autotools-style builds: `configure --prefix`, `make`, `make install`
pub struct ConfigureMake {
    env: ToolEnv,
}

impl ConfigureMake {
    pub fn new(env: ToolEnv) -> Self {
        Self { env }
    }

    fn flags(&self, flag: &str, sub: &str) -> String {
        self.env
            .dep_prefixes
            .iter()
            .map(|p| format!("{}{}", flag, p.join(sub).display()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn make(&self) -> std::process::Command {
        let mut cmd = self.env.command("make", &self.env.build_dir);
        cmd.env("CPPFLAGS", self.flags("-I", "include"))
            .env("LDFLAGS", self.flags("-L", "lib"));
        cmd
    }
}

impl BuildTool for ConfigureMake {
    fn name(&self) -> &'static str {
        "configure"
    }

    fn use_dep(&mut self, install_dir: &Path) {
        self.env.add_dep(install_dir);
    }

    fn configure(&mut self) -> KilnResult<()> {
        self.env.ensure_build_dir()?;

        let script = self.env.source_dir.join("configure");
        let mut cmd = self
            .env
            .command(&script.to_string_lossy(), &self.env.build_dir);
        cmd.arg(format!("--prefix={}", self.env.prefix.display()))
            .args(&self.env.args)
            .env("CPPFLAGS", self.flags("-I", "include"))
            .env("LDFLAGS", self.flags("-L", "lib"))
            .env(
                "PKG_CONFIG_PATH",
                join_search_path(self.env.dep_prefixes.iter().map(|p| p.join("lib").join("pkgconfig"))),
            );

        run_step(self.name(), "configure", cmd)
    }

    fn build(&mut self) -> KilnResult<()> {
        let mut cmd = self.make();
        cmd.arg(format!("-j{}", self.env.jobs));
        run_step(self.name(), "build", cmd)
    }

    fn install(&mut self) -> KilnResult<()> {
        let mut cmd = self.make();
        cmd.arg("install");
        run_step(self.name(), "install", cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::MatrixVariant;

    #[test]
    fn include_and_lib_flags_follow_deps() {
        let variant = MatrixVariant::parse("amd64-linux").unwrap();
        let mut tool = ConfigureMake::new(ToolEnv::new(
            "/src".into(),
            "/build".into(),
            "/out".into(),
            variant,
        ));
        tool.use_dep(Path::new("/deps/zlib"));
        tool.use_dep(Path::new("/deps/png"));

        assert_eq!(
            tool.flags("-I", "include"),
            format!(
                "-I{} -I{}",
                Path::new("/deps/zlib").join("include").display(),
                Path::new("/deps/png").join("include").display()
            )
        );
        assert!(tool.flags("-L", "lib").starts_with("-L"));
    }
}
