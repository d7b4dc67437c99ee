//! Stage-2 worker: decide whether one mutant is usable as a bug.
//!
//! A usable mutant builds, fails at least one test, passes at least one
//! test, and every failing test actually executes the mutated line.
//! Anything else records a terminal `mutant_type` and leaves the
//! `usable` gate unset. This worker also creates the bug's test-case
//! rows from the first full-suite run.

use anyhow::{ensure, Result};
use mbfl_coverage::CoverageReport;
use mbfl_types::{BugRecord, Gate, TestCaseRecord, TestOutcome};
use tracing::{info, warn};

use crate::mutant::{remove_gcda_files, Mutant};

use super::{line_covered, WorkerCtx};

pub(super) fn run(ctx: &WorkerCtx<'_>) -> Result<()> {
    let version = ctx.version()?;
    let target = ctx.target_file()?;
    let bug = ctx
        .store
        .bug_by_version(&ctx.args.subject, &ctx.args.experiment_label, version)?;

    let built = ctx.configure_and_build(true)?;
    ensure!(built, "baseline coverage build failed");

    let mutant = ctx.staged_mutant(version, target)?;
    mutant.apply_patch(false)?;

    let verdict = test_mutant(ctx, &bug, target, &mutant);
    mutant.apply_patch(true)?;

    match verdict? {
        Verdict::Usable => {
            ctx.store.set_gate(bug.bug_idx, Gate::Usable, true)?;
            info!(version, "mutant is usable");
        }
        Verdict::Rejected(reason) => {
            ctx.store.set_mutant_type(bug.bug_idx, reason)?;
            warn!(version, reason, "mutant rejected");
        }
    }
    Ok(())
}

enum Verdict {
    Usable,
    Rejected(&'static str),
}

fn test_mutant(
    ctx: &WorkerCtx<'_>,
    bug: &BugRecord,
    target: &str,
    mutant: &Mutant,
) -> Result<Verdict> {
    if !ctx.build()? {
        return Ok(Verdict::Rejected("build_failed"));
    }

    // First full-suite run; outcomes become this bug's tc rows.
    let testcases_dir = ctx.subject.testcases_dir();
    let timeout = ctx.test_timeout();
    let mut outcomes = Vec::new();
    for (tc_idx, tc_name) in ctx.subject.config.test_case_scripts.iter().enumerate() {
        remove_gcda_files(&ctx.subject.repo_dir)?;
        let outcome = mutant.run_test(&testcases_dir.join(tc_name), timeout, &ctx.envs)?;
        outcomes.push((tc_idx as u32, tc_name.clone(), outcome));
    }

    let failing: Vec<_> = outcomes
        .iter()
        .filter(|(_, _, o)| *o == TestOutcome::Fail)
        .collect();
    if failing.is_empty() {
        return Ok(Verdict::Rejected("no_failing_tcs"));
    }
    if !outcomes.iter().any(|(_, _, o)| *o == TestOutcome::Pass) {
        return Ok(Verdict::Rejected("no_passing_tcs"));
    }

    // Every failing test must execute the mutated line; a failure that
    // never reaches the mutation is caused by something else.
    let cov_json = ctx.assigned_dir.join("usable_check.json");
    for (_, tc_name, _) in &failing {
        remove_gcda_files(&ctx.subject.repo_dir)?;
        mutant.run_test(&testcases_dir.join(tc_name), timeout, &ctx.envs)?;
        ctx.collect_coverage(&cov_json)?;
        let report = CoverageReport::load(&cov_json)?;
        if !line_covered(&report, target, bug.mutation.pre_start_line) {
            return Ok(Verdict::Rejected("failing_tcs_do_not_cover_mutated_line"));
        }
    }

    let records: Vec<TestCaseRecord> = outcomes
        .into_iter()
        .map(|(tc_idx, tc_name, outcome)| {
            TestCaseRecord::new(bug.bug_idx, tc_idx, tc_name, outcome)
        })
        .collect();
    ctx.store.insert_test_cases(&records)?;
    Ok(Verdict::Usable)
}
