//! Local dispatch: one thread per slot, worker subprocesses on this
//! machine.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use mbfl_types::SlotId;

use crate::process::{run_command, run_script, EnvMap};
use crate::queue::TaskQueue;

use super::{
    resolve_self_binary, worker_command, BatchReport, ExecContext, Executor, WorkerTask,
};

const DEQUEUE_TICK: Duration = Duration::from_millis(200);

pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn run_batch(&self, ctx: &ExecContext, tasks: Vec<WorkerTask>) -> Result<BatchReport> {
        let binary = resolve_self_binary()?;
        prepare_slots(ctx)?;

        let total = tasks.len();
        let queue = Arc::new(TaskQueue::new());
        let report = Arc::new(Mutex::new(BatchReport::default()));
        let ctx = Arc::new(ctx.clone());
        let binary = Arc::new(binary);

        let mut handles = Vec::with_capacity(ctx.slots.len());
        for slot in ctx.slots.clone() {
            let queue = Arc::clone(&queue);
            let report = Arc::clone(&report);
            let ctx = Arc::clone(&ctx);
            let binary = Arc::clone(&binary);
            handles.push(std::thread::spawn(move || {
                while let Some(task) = queue.dequeue(DEQUEUE_TICK) {
                    let outcome = run_task(&binary, &ctx, &slot, &task);
                    let mut report = report.lock();
                    report.dispatched += 1;
                    match outcome {
                        Ok(true) => report.succeeded += 1,
                        Ok(false) => report.failed += 1,
                        Err(err) => {
                            report.abandoned += 1;
                            error!(
                                slot = %slot,
                                version = task.version.as_deref().unwrap_or("-"),
                                error = %format!("{err:#}"),
                                "task abandoned"
                            );
                        }
                    }
                }
                // Queue drained: leave the slot's working copy clean.
                clean_slot(&ctx, &slot);
            }));
        }

        for task in tasks {
            queue.enqueue(task);
        }
        queue.close();
        for handle in handles {
            let _ = handle.join();
        }

        let report = *report.lock();
        info!(
            stage = %ctx.stage,
            total,
            succeeded = report.succeeded,
            failed = report.failed,
            abandoned = report.abandoned,
            "local batch finished"
        );
        Ok(report)
    }
}

/// Create the per-slot working trees and give each slot its own copy
/// of the subject repository.
fn prepare_slots(ctx: &ExecContext) -> Result<()> {
    for slot in &ctx.slots {
        let core_dir = slot.core_dir(&ctx.working_env_dir);
        let assigned = slot.assigned_works_dir(&ctx.working_env_dir, ctx.stage.short_name());
        std::fs::create_dir_all(&assigned)
            .with_context(|| format!("create {}", assigned.display()))?;

        let repo_copy = core_dir.join(&ctx.subject);
        if !repo_copy.exists() {
            let code = run_command(
                "cp",
                &[
                    "-a",
                    &ctx.subject_repo_dir.display().to_string(),
                    &repo_copy.display().to_string(),
                ],
                &core_dir,
                &EnvMap::new(),
            )?;
            anyhow::ensure!(
                code == 0,
                "copy subject repo into {} failed",
                core_dir.display()
            );
        }
        debug!(slot = %slot, core_dir = %core_dir.display(), "slot prepared");
    }
    Ok(())
}

fn run_task(
    binary: &std::path::Path,
    ctx: &ExecContext,
    slot: &SlotId,
    task: &WorkerTask,
) -> Result<bool> {
    // Stage the input artifact into the slot's assigned-works dir.
    if let Some(artifact) = &task.artifact {
        let assigned = slot.assigned_works_dir(&ctx.working_env_dir, ctx.stage.short_name());
        let dest = assigned.join(
            artifact
                .file_name()
                .with_context(|| format!("artifact {} has no file name", artifact.display()))?,
        );
        std::fs::copy(artifact, &dest)
            .with_context(|| format!("stage artifact {}", artifact.display()))?;
    }

    let status = worker_command(binary, ctx, slot, task)
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .status()
        .context("spawn worker subprocess")?;

    if !status.success() {
        warn!(
            slot = %slot,
            version = task.version.as_deref().unwrap_or("-"),
            code = status.code().unwrap_or(-1),
            "worker exited with failure"
        );
    }
    Ok(status.success())
}

fn clean_slot(ctx: &ExecContext, slot: &SlotId) {
    let repo_copy = slot.core_dir(&ctx.working_env_dir).join(&ctx.subject);
    let clean_script = repo_copy.join("clean_script.sh");
    match run_script(&clean_script, &repo_copy, &EnvMap::new()) {
        Ok(0) => debug!(slot = %slot, "slot cleaned"),
        Ok(code) => warn!(slot = %slot, code, "clean script failed"),
        Err(err) => warn!(slot = %slot, error = %format!("{err:#}"), "clean script missing"),
    }
}
