//! Task dispatch across (machine, core) slots.
//!
//! An engine builds a batch of [`WorkerTask`]s and hands it to an
//! executor. Both executors drive the same loop: one thread per slot
//! competing on a shared [`TaskQueue`], each dequeued task re-invoking
//! this binary as a worker subprocess tagged with the slot identity.
//! Task failures are logged at the task boundary and never abort the
//! batch.

mod local;
mod remote;

pub use local::LocalExecutor;
pub use remote::RemoteExecutor;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

use mbfl_types::{RetryConfig, SlotId, Stage};

use crate::args::WorkerKind;

/// Which dispatch strategy to use. Resolved once from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Local,
    Remote,
}

/// One unit of work for a stage worker.
#[derive(Debug, Clone)]
pub struct WorkerTask {
    pub worker: WorkerKind,
    /// Mutant version the worker operates on; stage 1 tasks have none.
    pub version: Option<String>,
    /// Subject-relative path of the mutated file.
    pub target_file: Option<String>,
    /// Input artifact copied into the slot's assigned-works directory
    /// before the worker starts.
    pub artifact: Option<PathBuf>,
    pub needs_configuration: bool,
}

/// Shared context for a dispatched batch.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub subject: String,
    pub experiment_label: String,
    pub stage: Stage,
    pub working_env_dir: PathBuf,
    pub subject_repo_dir: PathBuf,
    pub db_path: PathBuf,
    pub slots: Vec<SlotId>,
    pub retry: RetryConfig,
    pub test_timeout_secs: u64,
}

/// Outcome counters for one batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks dropped because their artifact could not be delivered.
    pub abandoned: usize,
}

pub trait Executor {
    /// Run the whole batch to completion.
    fn run_batch(&self, ctx: &ExecContext, tasks: Vec<WorkerTask>) -> Result<BatchReport>;
}

pub fn executor_for(kind: ExecutorKind) -> Box<dyn Executor> {
    match kind {
        ExecutorKind::Local => Box::new(LocalExecutor),
        ExecutorKind::Remote => Box::new(RemoteExecutor),
    }
}

impl WorkerKind {
    /// The clap value-enum spelling, used when re-invoking the binary.
    pub fn as_flag(&self) -> &'static str {
        match self {
            WorkerKind::MutantGenerator => "mutant-generator",
            WorkerKind::UsableTester => "usable-tester",
            WorkerKind::PrerequisiteTester => "prerequisite-tester",
            WorkerKind::MutantMutantGenerator => "mutant-mutant-generator",
            WorkerKind::MbflTester => "mbfl-tester",
        }
    }
}

/// Locate this binary for worker re-invocation.
pub(crate) fn resolve_self_binary() -> Result<PathBuf> {
    use anyhow::Context;
    std::env::current_exe().context("current_exe")
}

/// Build the worker argv (everything after the program name) for one
/// task on one slot.
pub(crate) fn worker_argv(ctx: &ExecContext, slot: &SlotId, task: &WorkerTask) -> Vec<String> {
    let mut argv = vec![
        "--subject".into(),
        ctx.subject.clone(),
        "--experiment-label".into(),
        ctx.experiment_label.clone(),
        "--worker".into(),
        task.worker.as_flag().into(),
        "--machine".into(),
        slot.machine.clone(),
        "--core".into(),
        slot.core.to_string(),
        "--db".into(),
        ctx.db_path.display().to_string(),
        "--test-timeout-secs".into(),
        ctx.test_timeout_secs.to_string(),
    ];
    if let Some(version) = &task.version {
        argv.push("--version".into());
        argv.push(version.clone());
    }
    if let Some(target) = &task.target_file {
        argv.push("--target-file".into());
        argv.push(target.clone());
    }
    if task.needs_configuration {
        argv.push("--needs-configuration".into());
    }
    argv
}

/// Build the local worker command for one task.
pub(crate) fn worker_command(
    binary: &Path,
    ctx: &ExecContext,
    slot: &SlotId,
    task: &WorkerTask,
) -> Command {
    let mut cmd = Command::new(binary);
    cmd.args(worker_argv(ctx, slot, task));
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbfl_types::RetryConfig;

    fn context() -> ExecContext {
        ExecContext {
            subject: "zlib_ng".into(),
            experiment_label: "exp1".into(),
            stage: Stage::UsableSelection,
            working_env_dir: "/data/working_env".into(),
            subject_repo_dir: "/data/subjects/zlib_ng".into(),
            db_path: "/data/exp1/mbfl.db".into(),
            slots: vec![SlotId::new("localhost", 0, "/home/exp")],
            retry: RetryConfig::default(),
            test_timeout_secs: 60,
        }
    }

    #[test]
    fn worker_argv_carries_slot_and_mutant_identity() {
        let ctx = context();
        let slot = SlotId::new("worker3", 5, "/home/exp");
        let task = WorkerTask {
            worker: WorkerKind::UsableTester,
            version: Some("deflate.MUT1.c".into()),
            target_file: Some("src/deflate.c".into()),
            artifact: None,
            needs_configuration: true,
        };

        let argv = worker_argv(&ctx, &slot, &task);
        let joined = argv.join(" ");
        assert!(joined.contains("--worker usable-tester"));
        assert!(joined.contains("--machine worker3"));
        assert!(joined.contains("--core 5"));
        assert!(joined.contains("--version deflate.MUT1.c"));
        assert!(joined.contains("--needs-configuration"));
    }

    #[test]
    fn stage_one_tasks_omit_mutant_arguments() {
        let ctx = context();
        let slot = &ctx.slots[0];
        let task = WorkerTask {
            worker: WorkerKind::MutantGenerator,
            version: None,
            target_file: Some("src/deflate.c".into()),
            artifact: None,
            needs_configuration: false,
        };
        let argv = worker_argv(&ctx, slot, &task);
        assert!(!argv.iter().any(|a| a == "--version"));
        assert!(argv.iter().any(|a| a == "--target-file"));
    }
}
