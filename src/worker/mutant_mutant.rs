//! Stage-5 worker: generate second-order mutants for one bug.
//!
//! With the bug's patch applied, the external generator runs once per
//! candidate line, restricted to that line's span, and its ledgers
//! become `mutation_info` rows keyed back to the candidate index.

use anyhow::{ensure, Context, Result};
use mbfl_types::{Gate, LineRecord, MutationRecord};
use tracing::{info, warn};

use crate::engine::ledger_filename;
use crate::ledger::read_mutation_ledger;

use super::WorkerCtx;

pub(super) fn run(ctx: &WorkerCtx<'_>) -> Result<()> {
    let version = ctx.version()?;
    let target = ctx.target_file()?;
    let bug = ctx
        .store
        .bug_by_version(&ctx.args.subject, &ctx.args.experiment_label, version)?;
    let lines = ctx.store.lines(bug.bug_idx)?;
    ensure!(
        !lines.is_empty(),
        "bug {version} has no candidate lines; prerequisite extraction did not run"
    );

    let built = ctx.configure_and_build(false)?;
    ensure!(built, "baseline build failed");

    let mutant = ctx.staged_mutant(version, target)?;
    mutant.apply_patch(false)?;
    let records = generate_for_lines(ctx, version, &lines);
    mutant.apply_patch(true)?;
    let records = records?;

    if records.is_empty() {
        ctx.store
            .set_mutant_type(bug.bug_idx, "no_second_order_mutants")?;
        warn!(version, "no second-order mutants produced");
        return Ok(());
    }

    ctx.store.insert_mutations(&records)?;
    ctx.store
        .set_gate(bug.bug_idx, Gate::MutantsGenerated, true)?;
    info!(version, mutants = records.len(), "second-order mutants registered");
    Ok(())
}

/// Run the generator once per candidate line and collect ledger rows.
/// Lines whose file is not mutable on this subject (headers, generated
/// sources outside the compile database) are skipped, as are lines
/// where the generator produces nothing.
fn generate_for_lines(
    ctx: &WorkerCtx<'_>,
    version: &str,
    lines: &[LineRecord],
) -> Result<Vec<MutationRecord>> {
    let out_root = ctx.config.mutant_mutants_dir().join(version);
    std::fs::create_dir_all(&out_root)
        .with_context(|| format!("create {}", out_root.display()))?;
    let compile_commands = ctx.subject.compile_commands_path().display().to_string();

    let mut records = Vec::new();
    let mut mutant_idx = 0u32;
    for line in lines {
        let source = ctx.subject.repo_dir.join(&line.key.file);
        if !source.exists() {
            continue;
        }

        let dirname = format!("line{}", line.line_idx);
        let line_dir = out_root.join(&dirname);
        std::fs::create_dir_all(&line_dir)
            .with_context(|| format!("create {}", line_dir.display()))?;

        let source_str = source.display().to_string();
        let out_str = line_dir.display().to_string();
        let range = format!("{}", line.key.lineno);
        let code = crate::process::run_command(
            "music",
            &[
                &source_str,
                "-o",
                &out_str,
                "-l",
                "1",
                "-rs",
                &range,
                "-re",
                &range,
                "-p",
                &compile_commands,
            ],
            &ctx.subject.repo_dir,
            &ctx.envs,
        )?;
        if code != 0 {
            warn!(version, line = %line.key, code, "generator failed for candidate line");
            continue;
        }

        let ledger = line_dir.join(ledger_filename(&line.key.file));
        if !ledger.exists() {
            continue;
        }
        for entry in read_mutation_ledger(&ledger)? {
            records.push(MutationRecord {
                bug_idx: line.bug_idx,
                mutant_idx,
                targetting_file: line.key.file.clone(),
                mutation_dirname: dirname.clone(),
                mutant_filename: entry.mutant_name,
                line_idx: Some(line.line_idx),
                mut_op: entry.site.operator,
                build_result: None,
                result_transition: None,
            });
            mutant_idx += 1;
        }
    }
    Ok(records)
}
