//! Stage-6 worker: mutation testing for one bug.
//!
//! With the bug's patch applied as the baseline, every second-order
//! mutant is layered on top, built, and run against the bug's relevant
//! tests. The outcome transition counts (fail-to-pass, pass-to-fail)
//! against the baseline become the `result_transition` label.

use anyhow::{bail, ensure, Result};
use mbfl_types::{Gate, MutationRecord, TestCaseRecord, TestOutcome};
use tracing::{info, warn};

use crate::mutant::Mutant;

use super::WorkerCtx;

pub(super) fn run(ctx: &WorkerCtx<'_>) -> Result<()> {
    let version = ctx.version()?;
    let target = ctx.target_file()?;
    let bug = ctx
        .store
        .bug_by_version(&ctx.args.subject, &ctx.args.experiment_label, version)?;

    let tcs = ctx.store.test_cases(bug.bug_idx)?;
    let relevant: Vec<&TestCaseRecord> = tcs
        .iter()
        .filter(|t| t.relevant == Some(true))
        .collect();
    if relevant.is_empty() {
        bail!("bug {version} has no relevant tests");
    }
    let mutations = ctx.store.mutations_for_bug(bug.bug_idx)?;
    if mutations.is_empty() {
        bail!("bug {version} has no second-order mutants");
    }

    let built = ctx.configure_and_build(false)?;
    ensure!(built, "baseline build failed");

    let mutant = ctx.staged_mutant(version, target)?;
    mutant.apply_patch(false)?;
    let outcome = test_mutations(ctx, version, &mutations, &relevant);
    mutant.apply_patch(true)?;
    outcome?;

    ctx.store.set_gate(bug.bug_idx, Gate::Mbfl, true)?;
    info!(version, mutants = mutations.len(), "mutation testing complete");
    Ok(())
}

fn test_mutations(
    ctx: &WorkerCtx<'_>,
    version: &str,
    mutations: &[MutationRecord],
    relevant: &[&TestCaseRecord],
) -> Result<()> {
    let mm_root = ctx.config.mutant_mutants_dir().join(version);
    let testcases_dir = ctx.subject.testcases_dir();
    let timeout = ctx.test_timeout();

    for mutation in mutations {
        let mm_file = mm_root
            .join(&mutation.mutation_dirname)
            .join(&mutation.mutant_filename);
        if !mm_file.exists() {
            warn!(
                version,
                mutant = %mutation.mutant_filename,
                "second-order mutant file missing"
            );
            ctx.store
                .set_mutation_result(mutation.bug_idx, mutation.mutant_idx, false, None)?;
            continue;
        }

        let mm = Mutant::new(
            ctx.subject.repo_dir.join(&mutation.targetting_file),
            mm_file,
            ctx.assigned_dir
                .join(format!("{}.patch", mutation.mutant_filename)),
        )?;
        mm.make_patch_file()?;
        mm.apply_patch(false)?;

        if !ctx.build()? {
            ctx.store
                .set_mutation_result(mutation.bug_idx, mutation.mutant_idx, false, None)?;
            mm.apply_patch(true)?;
            continue;
        }

        // Transitions are counted against the baseline outcomes the
        // prerequisite stage recorded for this bug.
        let mut f2p = 0u32;
        let mut p2f = 0u32;
        for tc in relevant {
            let outcome = mm.run_test(&testcases_dir.join(&tc.tc_name), timeout, &ctx.envs)?;
            match (tc.outcome, outcome) {
                (TestOutcome::Fail, TestOutcome::Pass) => f2p += 1,
                (TestOutcome::Pass, TestOutcome::Fail) => p2f += 1,
                _ => {}
            }
        }
        let transition = format!("f2p:{f2p},p2f:{p2f}");
        ctx.store.set_mutation_result(
            mutation.bug_idx,
            mutation.mutant_idx,
            true,
            Some(&transition),
        )?;
        mm.apply_patch(true)?;
    }
    Ok(())
}
