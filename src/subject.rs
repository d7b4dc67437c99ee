//! Subject model: repository layout, toolchain scripts and the
//! `configurations.json` contract.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::process::EnvMap;

/// `configurations.json` as shipped inside a subject repository.
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectConfig {
    /// Path of the compile-commands database, relative to the subject's
    /// parent directory.
    pub compile_command_path: String,
    /// Test-case script names, run relative to the testcases directory.
    pub test_case_scripts: Vec<String>,
    /// Subject-relative source files eligible for mutation.
    pub target_files: Vec<String>,
    #[serde(default)]
    pub environment_setting: EnvironmentSetting,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentSetting {
    #[serde(default)]
    pub needed: bool,
    /// Variable name -> core-relative path appended under the slot's
    /// core directory.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// One subject checkout with its toolchain scripts resolved.
#[derive(Debug, Clone)]
pub struct Subject {
    pub name: String,
    pub repo_dir: PathBuf,
    pub configure_no_cov_script: PathBuf,
    pub configure_cov_script: PathBuf,
    pub build_script: PathBuf,
    pub clean_script: PathBuf,
    pub config: SubjectConfig,
}

impl Subject {
    /// Load the subject rooted at `repo_dir` and verify its toolchain
    /// contract up front; a missing script aborts the run before any
    /// task is dispatched.
    pub fn load(name: &str, repo_dir: &Path) -> Result<Self> {
        let configure_no_cov_script = repo_dir.join("configure_no_cov_script.sh");
        let configure_cov_script = repo_dir.join("configure_yes_cov_script.sh");
        let build_script = repo_dir.join("build_script.sh");
        let clean_script = repo_dir.join("clean_script.sh");
        let configurations_json = repo_dir.join("configurations.json");

        for (what, path) in [
            ("configure (no coverage) script", &configure_no_cov_script),
            ("configure (coverage) script", &configure_cov_script),
            ("build script", &build_script),
            ("clean script", &clean_script),
            ("configurations.json", &configurations_json),
        ] {
            if !path.exists() {
                bail!("subject {name}: {what} missing at {}", path.display());
            }
        }

        let text = std::fs::read_to_string(&configurations_json)
            .with_context(|| format!("read {}", configurations_json.display()))?;
        let config: SubjectConfig = serde_json::from_str(&text)
            .with_context(|| format!("parse {}", configurations_json.display()))?;
        if config.target_files.is_empty() {
            bail!("subject {name}: configurations.json lists no target files");
        }

        debug!(
            subject = name,
            targets = config.target_files.len(),
            tests = config.test_case_scripts.len(),
            "subject loaded"
        );
        Ok(Self {
            name: name.to_string(),
            repo_dir: repo_dir.to_path_buf(),
            configure_no_cov_script,
            configure_cov_script,
            build_script,
            clean_script,
            config,
        })
    }

    /// Compile-commands path, resolved against the subject's parent.
    pub fn compile_commands_path(&self) -> PathBuf {
        match self.repo_dir.parent() {
            Some(parent) => parent.join(&self.config.compile_command_path),
            None => PathBuf::from(&self.config.compile_command_path),
        }
    }

    /// Directory holding the test-case scripts.
    pub fn testcases_dir(&self) -> PathBuf {
        self.repo_dir.join("testcases")
    }

    /// Build the explicit environment map for a worker running inside
    /// `core_dir`. Paths are rooted under the core directory; an
    /// existing value of the same variable is kept as a suffix. The
    /// process environment itself is never mutated.
    pub fn env_for_core(&self, core_dir: &Path) -> EnvMap {
        let mut envs = EnvMap::new();
        if !self.config.environment_setting.needed {
            return envs;
        }
        for (key, value) in &self.config.environment_setting.variables {
            let path = core_dir.join(value);
            let entry = match std::env::var(key) {
                Ok(existing) if !existing.is_empty() => {
                    format!("{}:{existing}", path.display())
                }
                _ => path.display().to_string(),
            };
            envs.push((key.clone(), entry));
        }
        envs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_subject(dir: &Path, config: &str) {
        for script in [
            "configure_no_cov_script.sh",
            "configure_yes_cov_script.sh",
            "build_script.sh",
            "clean_script.sh",
        ] {
            std::fs::write(dir.join(script), "#!/bin/bash\n").unwrap();
        }
        std::fs::write(dir.join("configurations.json"), config).unwrap();
    }

    #[test]
    fn loads_a_complete_subject() {
        let tmp = TempDir::new().unwrap();
        write_subject(
            tmp.path(),
            r#"{
                "compile_command_path": "zlib_ng/compile_commands.json",
                "test_case_scripts": ["TC1.sh", "TC2.sh"],
                "target_files": ["src/deflate.c"],
                "environment_setting": {
                    "needed": true,
                    "variables": {"LD_LIBRARY_PATH": "zlib_ng/build/lib"}
                }
            }"#,
        );

        let subject = Subject::load("zlib_ng", tmp.path()).unwrap();
        assert_eq!(subject.config.target_files, vec!["src/deflate.c"]);

        let envs = subject.env_for_core(Path::new("/work/core0"));
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].0, "LD_LIBRARY_PATH");
        assert!(envs[0].1.starts_with("/work/core0/zlib_ng/build/lib"));
    }

    #[test]
    fn missing_script_is_a_startup_error() {
        let tmp = TempDir::new().unwrap();
        write_subject(
            tmp.path(),
            r#"{"compile_command_path": "x", "test_case_scripts": [], "target_files": ["a.c"]}"#,
        );
        std::fs::remove_file(tmp.path().join("build_script.sh")).unwrap();
        assert!(Subject::load("zlib_ng", tmp.path()).is_err());
    }

    #[test]
    fn empty_target_list_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_subject(
            tmp.path(),
            r#"{"compile_command_path": "x", "test_case_scripts": [], "target_files": []}"#,
        );
        assert!(Subject::load("zlib_ng", tmp.path()).is_err());
    }
}
