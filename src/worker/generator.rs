//! Stage-1 worker: run the external mutant generator for one target
//! file. Output (mutant sources plus the CSV ledger) lands in the
//! shared generated-mutants directory; the dispatching engine reads the
//! ledger afterwards and registers the mutants.

use anyhow::{ensure, Context, Result};
use tracing::info;

use crate::engine::mutant_dirname;

use super::WorkerCtx;

pub(super) fn run(ctx: &WorkerCtx<'_>) -> Result<()> {
    let target = ctx.target_file()?;

    let out_dir = ctx
        .config
        .generated_mutants_dir()
        .join(mutant_dirname(target));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create {}", out_dir.display()))?;

    // The generator consults the compile-commands database, so the
    // subject must be configured and built once on this slot first.
    let built = ctx.configure_and_build(false)?;
    ensure!(built, "baseline build failed before mutant generation");

    let target_abs = ctx.subject.repo_dir.join(target).display().to_string();
    let out_str = out_dir.display().to_string();
    let compile_commands = ctx.subject.compile_commands_path().display().to_string();
    let code = crate::process::run_command(
        "music",
        &[
            &target_abs,
            "-o",
            &out_str,
            "-l",
            "2",
            "-p",
            &compile_commands,
        ],
        &ctx.subject.repo_dir,
        &ctx.envs,
    )?;
    ensure!(code == 0, "mutant generator exited with {code} for {target}");

    info!(target, out_dir = %out_dir.display(), "mutants generated");
    Ok(())
}
