//! Remote dispatch: artifacts travel by `rsync`, workers run over
//! `ssh`. The filesystem layout is mirrored on every machine, so slot
//! paths are used verbatim on the remote side.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use mbfl_types::SlotId;

use crate::process::{run_command, EnvMap};
use crate::queue::TaskQueue;

use super::{resolve_self_binary, worker_argv, BatchReport, ExecContext, Executor, WorkerTask};

const DEQUEUE_TICK: Duration = Duration::from_millis(200);

pub struct RemoteExecutor;

impl Executor for RemoteExecutor {
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
            "remote batch finished"
        );
        Ok(report)
    }
}

/// Create the slot working trees remotely and clean each slot's
/// subject copy before the batch starts.
fn prepare_slots(ctx: &ExecContext) -> Result<()> {
    for slot in &ctx.slots {
        let assigned = slot.assigned_works_dir(&ctx.working_env_dir, ctx.stage.short_name());
        ssh(slot, &format!("mkdir -p {}", assigned.display()))?;

        let repo_copy = slot.core_dir(&ctx.working_env_dir).join(&ctx.subject);
        ssh(
            slot,
            &format!(
                "[ -d {repo} ] || cp -a {src} {repo}",
                repo = repo_copy.display(),
                src = ctx.subject_repo_dir.display()
            ),
        )?;
        clean_slot(ctx, slot);
        debug!(slot = %slot, "remote slot prepared");
    }
    Ok(())
}

fn run_task(
    binary: &Path,
    ctx: &ExecContext,
    slot: &SlotId,
    task: &WorkerTask,
) -> Result<bool> {
    if let Some(artifact) = &task.artifact {
        let assigned = slot.assigned_works_dir(&ctx.working_env_dir, ctx.stage.short_name());
        copy_with_retry(ctx, slot, artifact, &assigned)?;
    }

    let argv = worker_argv(ctx, slot, task)
        .into_iter()
        .map(|a| shell_quote(&a))
        .collect::<Vec<_>>()
        .join(" ");
    let code = ssh(slot, &format!("{} {argv}", binary.display()))?;
    if code != 0 {
        warn!(
            slot = %slot,
            version = task.version.as_deref().unwrap_or("-"),
            code,
            "remote worker exited with failure"
        );
    }
    Ok(code == 0)
}

/// Copy one artifact to the slot, retrying per the configured policy.
/// A copy that still fails abandons the task.
fn copy_with_retry(ctx: &ExecContext, slot: &SlotId, artifact: &Path, dest: &Path) -> Result<()> {
    let target = format!("{}:{}/", slot.machine, dest.display());
    let src = artifact.display().to_string();
    let mut attempt = 0;
    loop {
        let code = run_command("rsync", &["-az", &src, &target], Path::new("."), &EnvMap::new())?;
        if code == 0 {
            return Ok(());
        }
        if attempt >= ctx.retry.retries {
            bail!("rsync {src} -> {target} failed after {} attempts", attempt + 1);
        }
        attempt += 1;
        warn!(slot = %slot, artifact = %src, attempt, "artifact copy failed, retrying");
        std::thread::sleep(ctx.retry.backoff);
    }
}

fn clean_slot(ctx: &ExecContext, slot: &SlotId) {
    let repo_copy = slot.core_dir(&ctx.working_env_dir).join(&ctx.subject);
    let cmd = format!(
        "cd {repo} && bash clean_script.sh",
        repo = repo_copy.display()
    );
    match ssh(slot, &cmd) {
        Ok(0) => debug!(slot = %slot, "remote slot cleaned"),
        Ok(code) => warn!(slot = %slot, code, "remote clean failed"),
        Err(err) => warn!(slot = %slot, error = %format!("{err:#}"), "remote clean errored"),
    }
}

fn ssh(slot: &SlotId, command: &str) -> Result<i32> {
    run_command(
        "ssh",
        &["-o", "BatchMode=yes", &slot.machine, command],
        Path::new("."),
        &EnvMap::new(),
    )
    .with_context(|| format!("ssh {}", slot.machine))
}

fn shell_quote(arg: &str) -> String {
    if arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
