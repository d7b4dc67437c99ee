//! Stage workers.
//!
//! A worker is one subprocess invocation on one (machine, core) slot,
//! dispatched by an executor. It operates on a single mutant (or, for
//! stage 1, a single target file), works entirely inside the slot's
//! private directory tree, and flips its stage's gate in the datastore
//! on success. Rejection writes a terminal `mutant_type` and exits
//! cleanly; only infrastructure problems surface as errors.

mod generator;
mod mbfl;
mod mutant_mutant;
mod prerequisite;
mod usable;

use anyhow::{bail, ensure, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use mbfl_coverage::CoverageReport;
use mbfl_store::Store;
use mbfl_types::{SlotId, Stage};

use crate::args::{Args, WorkerKind};
use crate::config::ExperimentConfig;
use crate::mutant::Mutant;
use crate::process::{run_capturing, run_command, run_script, EnvMap};
use crate::subject::Subject;

/// Everything a worker touches, resolved once at startup.
pub struct WorkerCtx<'a> {
    pub args: &'a Args,
    pub config: &'a ExperimentConfig,
    pub store: &'a Store,
    pub slot: SlotId,
    /// The slot's private copy of the subject repository.
    pub subject: Subject,
    /// Explicit environment for every child process on this slot.
    pub envs: EnvMap,
    /// Stage artifacts staged for this slot by the executor.
    pub assigned_dir: PathBuf,
}

fn stage_for(kind: WorkerKind) -> Stage {
    match kind {
        WorkerKind::MutantGenerator => Stage::MutantGeneration,
        WorkerKind::UsableTester => Stage::UsableSelection,
        WorkerKind::PrerequisiteTester => Stage::PrerequisiteExtraction,
        WorkerKind::MutantMutantGenerator => Stage::MutantMutantGeneration,
        WorkerKind::MbflTester => Stage::MbflExtraction,
    }
}

/// Run one worker invocation to completion.
pub fn run(
    kind: WorkerKind,
    args: &Args,
    config: &ExperimentConfig,
    store: &Store,
) -> Result<()> {
    let machine = args.machine.as_deref().context("--machine is required")?;
    let core = args.core.context("--core is required")?;
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    let slot = SlotId::new(machine, core, home);

    let core_dir = slot.core_dir(&config.working_env_dir);
    let repo_copy = core_dir.join(&args.subject);
    let subject = Subject::load(&args.subject, &repo_copy)?;
    let envs = subject.env_for_core(&core_dir);
    let assigned_dir =
        slot.assigned_works_dir(&config.working_env_dir, stage_for(kind).short_name());

    let ctx = WorkerCtx {
        args,
        config,
        store,
        slot,
        subject,
        envs,
        assigned_dir,
    };
    info!(worker = ?kind, slot = %ctx.slot, "worker starting");

    match kind {
        WorkerKind::MutantGenerator => generator::run(&ctx),
        WorkerKind::UsableTester => usable::run(&ctx),
        WorkerKind::PrerequisiteTester => prerequisite::run(&ctx),
        WorkerKind::MutantMutantGenerator => mutant_mutant::run(&ctx),
        WorkerKind::MbflTester => mbfl::run(&ctx),
    }
}

impl WorkerCtx<'_> {
    fn version(&self) -> Result<&str> {
        self.args
            .version
            .as_deref()
            .context("--version is required for this worker")
    }

    fn target_file(&self) -> Result<&str> {
        self.args
            .target_file
            .as_deref()
            .context("--target-file is required for this worker")
    }

    fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.args.test_timeout_secs)
    }

    /// Configure (when dispatched with `--needs-configuration`) and
    /// build the subject in the slot's repo copy. Configure failures
    /// are infrastructure errors; a build failure is an outcome.
    fn configure_and_build(&self, coverage: bool) -> Result<bool> {
        if self.args.needs_configuration {
            let script = if coverage {
                &self.subject.configure_cov_script
            } else {
                &self.subject.configure_no_cov_script
            };
            let code = run_script(script, &self.subject.repo_dir, &self.envs)?;
            ensure!(code == 0, "configure script failed with {code}");
        }
        self.build()
    }

    /// Run the build script; true iff it exits 0.
    fn build(&self) -> Result<bool> {
        let code = run_script(&self.subject.build_script, &self.subject.repo_dir, &self.envs)?;
        Ok(code == 0)
    }

    /// Construct the mutant handle from the artifact the executor
    /// staged into the assigned-works directory, and create its patch.
    fn staged_mutant(&self, version: &str, target_file: &str) -> Result<Mutant> {
        let mutant_file = self.assigned_dir.join(version);
        if !mutant_file.exists() {
            bail!("staged mutant missing at {}", mutant_file.display());
        }
        let target = self.subject.repo_dir.join(target_file);
        let patch = self.assigned_dir.join(format!("{version}.patch"));
        let mutant = Mutant::new(target, mutant_file, patch)?;
        mutant.make_patch_file()?;
        Ok(mutant)
    }

    /// Collect line coverage of the last test run into a JSON report.
    fn collect_coverage(&self, out: &Path) -> Result<()> {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let out_str = out.display().to_string();
        let code = run_command(
            "gcovr",
            &["-r", ".", "--json", "-o", &out_str],
            &self.subject.repo_dir,
            &self.envs,
        )?;
        ensure!(code == 0, "gcovr exited with {code}");
        Ok(())
    }

    /// Re-run one test under gdb with a breakpoint on the mutated line
    /// and return the backtrace text (frame lines only).
    fn capture_stacktrace(
        &self,
        tc_script: &Path,
        source_file: &str,
        lineno: u32,
    ) -> Result<String> {
        let exec_point = execution_point(tc_script)?;
        let exec_cmd = extract_execution_cmd(tc_script)?;

        let gdb_script = self.assigned_dir.join("gdb_script.txt");
        std::fs::write(
            &gdb_script,
            format!("set confirm off\nbreak {source_file}:{lineno}\nr\nbt\nc\nq\n"),
        )
        .with_context(|| format!("write {}", gdb_script.display()))?;

        let gdb_script_str = gdb_script.display().to_string();
        let mut argv: Vec<&str> = vec!["-q", "-x", &gdb_script_str, "--args"];
        argv.extend(exec_cmd.iter().map(String::as_str));
        let lines = run_capturing("gdb", &argv, &exec_point, &self.envs)?;
        Ok(stacktrace_from_gdb_output(&lines))
    }
}

/// The directory a test script executes from: its first line is a `cd`
/// relative to the testcases directory.
fn execution_point(tc_script: &Path) -> Result<PathBuf> {
    let text = std::fs::read_to_string(tc_script)
        .with_context(|| format!("read test script {}", tc_script.display()))?;
    let tc_dir = tc_script
        .parent()
        .with_context(|| format!("test script {} has no parent dir", tc_script.display()))?;
    match text.lines().next().map(str::trim) {
        Some(first) if first.starts_with("cd ") => Ok(tc_dir.join(first[3..].trim())),
        _ => Ok(tc_dir.to_path_buf()),
    }
}

/// The program invocation inside a test script: the first line
/// containing a `./`-relative executable, taken from that token on.
/// Typical script shape:
/// ```text
/// cd ../build/
/// timeout 2s ./test_binary --filter=case
/// ```
fn extract_execution_cmd(tc_script: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(tc_script)
        .with_context(|| format!("read test script {}", tc_script.display()))?;
    for line in text.lines() {
        let line = line.trim();
        if let Some(idx) = line.find("./") {
            return Ok(line[idx..].split_whitespace().map(str::to_owned).collect());
        }
    }
    bail!(
        "no `./` execution command found in {}",
        tc_script.display()
    )
}

/// gdb interleaves prompts and source echo with the backtrace; only
/// lines starting with `#` are frames.
fn stacktrace_from_gdb_output(lines: &[String]) -> String {
    lines
        .iter()
        .filter(|l| l.starts_with('#'))
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

/// True iff the coverage report shows `lineno` of `target_file`
/// executed. Report paths come from the build tree, so files match by
/// suffix in either direction.
fn line_covered(report: &CoverageReport, target_file: &str, lineno: u32) -> bool {
    report.files.iter().any(|f| {
        (f.file.ends_with(target_file) || target_file.ends_with(&f.file))
            && f.lines
                .iter()
                .any(|l| l.line_number == lineno && l.count > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbfl_coverage::{FileCoverage, LineExecution};
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn execution_cmd_is_sliced_from_the_dot_slash_token() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(
            tmp.path(),
            "TC1.sh",
            "cd ../build/\ntimeout 2s ./gtest_zlib --gtest_filter=compress.basic\n",
        );
        let cmd = extract_execution_cmd(&script).unwrap();
        assert_eq!(cmd, vec!["./gtest_zlib", "--gtest_filter=compress.basic"]);
    }

    #[test]
    fn script_without_execution_cmd_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "TC1.sh", "echo nothing to run\n");
        assert!(extract_execution_cmd(&script).is_err());
    }

    #[test]
    fn execution_point_follows_the_leading_cd() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(tmp.path(), "TC1.sh", "cd ../build/\n./t\n");
        assert_eq!(
            execution_point(&script).unwrap(),
            tmp.path().join("../build/")
        );

        let plain = write_script(tmp.path(), "TC2.sh", "./t\n");
        assert_eq!(execution_point(&plain).unwrap(), tmp.path());
    }

    #[test]
    fn gdb_output_is_filtered_to_frame_lines() {
        let lines: Vec<String> = [
            "Breakpoint 1, deflate_stored () at deflate.c:1423",
            "#0  deflate_stored () at deflate.c:1423",
            "1423\t    len = 0;",
            "#1  0x0000555555 in deflate (s=0x1) at deflate.c:800",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let trace = stacktrace_from_gdb_output(&lines);
        assert_eq!(trace.lines().count(), 2);
        assert!(trace.starts_with("#0"));
    }

    #[test]
    fn line_coverage_check_matches_by_path_suffix() {
        let report = CoverageReport {
            files: vec![FileCoverage {
                file: "build/../src/deflate.c".into(),
                lines: vec![
                    LineExecution { line_number: 1423, count: 7 },
                    LineExecution { line_number: 1424, count: 0 },
                ],
            }],
        };
        assert!(line_covered(&report, "src/deflate.c", 1423));
        assert!(!line_covered(&report, "src/deflate.c", 1424));
        assert!(!line_covered(&report, "src/inflate.c", 1423));
    }
}
