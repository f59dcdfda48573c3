//! Integration tests for kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A formulas/sources/manifest layout plus a config pointing at it:
    /// demo/app 1.0 discovers demo/lib >= 2.0; demo/lib has no discovery
    /// and relies on the manifest.
    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                dir: TempDir::new().unwrap(),
            };
            fixture.formula(
                "demo/app",
                "[discover]\nfile = \"kiln.deps\"\n",
            );
            fixture.formula("demo/lib", "");
            fixture.source("demo/app", "1.0", "kiln.deps", "demo/lib 2.0\n");
            fixture.write(
                "manifest.toml",
                "[modules.\"demo/lib\"]\n\"2.0\" = []\n",
            );

            let root = fixture.root().display().to_string();
            fixture.write(
                "config.toml",
                &format!(
                    "[general]\njournal = true\n\n[paths]\nformulas_dir = \"{root}/formulas\"\nsources_dir = \"{root}/sources\"\ninstall_root = \"{root}/install\"\nmanifest = \"{root}/manifest.toml\"\nbuild_dir = \"{root}/build\"\nstate_dir = \"{root}/state\"\n\n[build]\nmatrix = [\"amd64-linux\"]\njobs = 2\n"
                ),
            );
            fixture
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn config(&self) -> PathBuf {
            self.root().join("config.toml")
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.root().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn formula(&self, path: &str, extra: &str) {
            self.write(
                &format!("formulas/{path}/formula.toml"),
                &format!(
                    "[formula]\npath = \"{path}\"\nfrom_ver = \"0.1\"\n\n{extra}\n[build]\ntool = \"configure\"\n"
                ),
            );
        }

        fn source(&self, path: &str, version: &str, file: &str, content: &str) {
            self.write(&format!("sources/{path}/{version}/{file}"), content);
        }

        fn kiln(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("kiln");
            cmd.current_dir(self.root())
                .env("KILN_CONFIG", self.config())
                .env("KILN_PLAIN", "1")
                .env_remove("RUST_LOG")
                .arg("--no-local");
            cmd
        }
    }

    fn kiln() -> Command {
        cargo_bin_cmd!("kiln")
    }

    #[test]
    fn help_displays() {
        kiln()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("native libraries"));
    }

    #[test]
    fn version_displays() {
        kiln()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn config_path() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[paths]"))
            .stdout(predicate::str::contains("amd64-linux"));
    }

    #[test]
    fn config_set_then_show() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["config", "set", "build.jobs", "7"])
            .assert()
            .success();
        fx.kiln()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("jobs = 7"));
    }

    #[test]
    fn config_set_unknown_key() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["config", "set", "build.colour", "red"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn resolve_table_marks_static_fallback() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["resolve", "demo/app@1.0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("demo/lib"))
            .stdout(predicate::str::contains("static"))
            .stdout(predicate::str::contains("Total: 2 module(s)"));
    }

    #[test]
    fn resolve_json_lists_dependencies_first() {
        let fx = Fixture::new();
        let output = fx
            .kiln()
            .args(["resolve", "demo/app@1.0", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["root"]["path"], "demo/app");
        let nodes = json["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["module"]["path"], "demo/lib");
        assert_eq!(nodes[0]["source"], "static_fallback");
        assert_eq!(nodes[1]["source"], "dynamic");
    }

    #[test]
    fn resolve_uses_latest_version() {
        let fx = Fixture::new();
        fx.source("demo/app", "0.9", "kiln.deps", "");
        fx.kiln()
            .args(["resolve", "demo/app", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::diff("demo/lib@2.0\ndemo/app@1.0\n"));
    }

    #[test]
    fn resolve_cycle_fails() {
        let fx = Fixture::new();
        fx.write(
            "manifest.toml",
            "[modules.\"demo/lib\"]\n\"2.0\" = [\"demo/app@1.0\"]\n",
        );
        fx.kiln()
            .args(["resolve", "demo/app@1.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Resolution error"))
            .stderr(predicate::str::contains("dependency cycle"));
    }

    #[test]
    fn resolve_without_formula_fails() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["resolve", "nobody/home@1.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no formula for nobody/home@1.0"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_failure_blocks_dependents() {
        // demo/lib has no source tree, so its hook fails; demo/app never runs
        let fx = Fixture::new();
        fx.kiln()
            .args(["build", "demo/app@1.0"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("[FAIL]"))
            .stdout(predicate::str::contains("source tree not found"))
            .stdout(predicate::str::contains("[-] demo/app@1.0 [amd64-linux]"))
            .stderr(predicate::str::contains("2 of 2 builds failed"));

        let journal = fs::read_to_string(fx.root().join("state/journal.log")).unwrap();
        assert!(journal.contains("\"resolve.finish\""));
        assert!(journal.contains("\"run.finish\""));
        assert!(!fx.root().join("install/demo/app").exists());
    }

    #[test]
    fn build_resolution_error_runs_nothing() {
        let fx = Fixture::new();
        fx.write("manifest.toml", "");
        fx.kiln()
            .args(["build", "demo/app@1.0", "--matrix", "amd64-linux,arm64-darwin"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Resolution error"))
            .stderr(predicate::str::contains("no dependency information for demo/lib@2.0"));
    }

    #[test]
    fn build_rejects_bad_variant() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["build", "demo/app@1.0", "--matrix", "amd64/linux"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid matrix variant"));
    }

    #[test]
    fn cache_list_empty() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached build results"));
    }

    #[test]
    fn cache_list_json_empty() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_clear_empty() {
        let fx = Fixture::new();
        fx.kiln()
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached build results to clear"));
    }

    #[test]
    fn completions_generate() {
        kiln()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }
}
