//! Patch lifecycle and test execution for one mutant.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

use mbfl_types::TestOutcome;

use crate::process::{run_test_script, EnvMap};

/// One mutant applied to a working copy of the subject: the pristine
/// target file, the mutated file produced by the generator, and the
/// patch mediating between them.
#[derive(Debug, Clone)]
pub struct Mutant {
    pub target_file: PathBuf,
    pub mutant_file: PathBuf,
    pub patch_file: PathBuf,
    pub name: String,
}

impl Mutant {
    pub fn new(target_file: PathBuf, mutant_file: PathBuf, patch_file: PathBuf) -> Result<Self> {
        let name = mutant_file
            .file_name()
            .with_context(|| format!("mutant path {} has no file name", mutant_file.display()))?
            .to_string_lossy()
            .into_owned();
        Ok(Self {
            target_file,
            mutant_file,
            patch_file,
            name,
        })
    }

    /// Create the patch with `diff`. Exit code 1 means differences
    /// found, which is the expected case; only >1 is an error.
    pub fn make_patch_file(&self) -> Result<()> {
        let out = File::create(&self.patch_file)
            .with_context(|| format!("create patch file {}", self.patch_file.display()))?;
        let status = Command::new("diff")
            .arg(&self.target_file)
            .arg(&self.mutant_file)
            .stdout(Stdio::from(out))
            .stderr(Stdio::null())
            .status()
            .context("spawn diff")?;
        match status.code() {
            Some(0) | Some(1) => Ok(()),
            code => bail!(
                "diff {} {} exited with {code:?}",
                self.target_file.display(),
                self.mutant_file.display()
            ),
        }
    }

    /// Apply (or revert) the patch in place on the target file.
    pub fn apply_patch(&self, revert: bool) -> Result<()> {
        let mut cmd = Command::new("patch");
        if revert {
            cmd.arg("-R");
        }
        let output = cmd
            .arg("-i")
            .arg(&self.patch_file)
            .arg(&self.target_file)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .context("spawn patch")?;
        if !output.status.success() {
            bail!(
                "patch{} -i {} {} failed: {}",
                if revert { " -R" } else { "" },
                self.patch_file.display(),
                self.target_file.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!(mutant = %self.name, revert, "patch applied");
        Ok(())
    }

    /// Run one test-case script against the current build and classify
    /// its exit code.
    pub fn run_test(
        &self,
        tc_script: &Path,
        timeout: Duration,
        envs: &EnvMap,
    ) -> Result<TestOutcome> {
        let code = run_test_script(tc_script, timeout, envs)?;
        let outcome = TestOutcome::from_exit_code(code);
        info!(
            mutant = %self.name,
            test = %tc_script.display(),
            code,
            outcome = %outcome,
            "test case finished"
        );
        Ok(outcome)
    }
}

/// Remove all `.gcda` counter files below `build_dir` so the next test
/// run starts from zero coverage.
pub fn remove_gcda_files(build_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let mut stack = vec![build_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "gcda") {
                std::fs::remove_file(&path)
                    .with_context(|| format!("remove {}", path.display()))?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn patch_round_trip_restores_the_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("deflate.c");
        let mutant_file = tmp.path().join("deflate.MUT1.c");
        let patch = tmp.path().join("deflate.MUT1.patch");
        std::fs::write(&target, "int f() { return a + b; }\n").unwrap();
        std::fs::write(&mutant_file, "int f() { return a - b; }\n").unwrap();

        let mutant = Mutant::new(target.clone(), mutant_file, patch).unwrap();
        mutant.make_patch_file().unwrap();

        mutant.apply_patch(false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "int f() { return a - b; }\n"
        );

        mutant.apply_patch(true).unwrap();
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "int f() { return a + b; }\n"
        );
    }

    #[test]
    fn identical_files_produce_an_empty_patch() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a.c");
        let mutant_file = tmp.path().join("a.MUT1.c");
        let patch = tmp.path().join("a.MUT1.patch");
        std::fs::write(&target, "x\n").unwrap();
        std::fs::write(&mutant_file, "x\n").unwrap();

        let mutant = Mutant::new(target, mutant_file, patch.clone()).unwrap();
        mutant.make_patch_file().unwrap();
        assert_eq!(std::fs::metadata(&patch).unwrap().len(), 0);
    }

    #[test]
    fn gcda_cleanup_only_touches_counter_files() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("build").join("obj");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("deflate.gcda"), "x").unwrap();
        std::fs::write(nested.join("deflate.gcno"), "x").unwrap();

        let removed = remove_gcda_files(tmp.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(nested.join("deflate.gcno").exists());
        assert!(!nested.join("deflate.gcda").exists());
    }
}
