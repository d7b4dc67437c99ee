//! Stage-3 worker: run the full suite with coverage instrumentation,
//! capture failing-test backtraces, and reduce the raw coverage into
//! the bug's candidate space.
//!
//! The heavy lifting after data collection lives in
//! [`crate::postprocess`]; this worker's job is producing one coverage
//! report per test plus one backtrace per failing test, then flipping
//! the `prerequisites` gate when reduction succeeds.

use anyhow::{bail, ensure, Context, Result};
use mbfl_types::{Gate, TestCaseRecord, TestOutcome};
use tracing::{error, info, warn};

use crate::mutant::{remove_gcda_files, Mutant};
use crate::postprocess;

use super::WorkerCtx;

pub(super) fn run(ctx: &WorkerCtx<'_>) -> Result<()> {
    let version = ctx.version()?;
    let target = ctx.target_file()?;
    let bug = ctx
        .store
        .bug_by_version(&ctx.args.subject, &ctx.args.experiment_label, version)?;
    let tcs = ctx.store.test_cases(bug.bug_idx)?;
    if tcs.is_empty() {
        bail!("bug {version} has no test-case rows; usable selection did not run");
    }

    let built = ctx.configure_and_build(true)?;
    ensure!(built, "baseline coverage build failed");

    let mutant = ctx.staged_mutant(version, target)?;
    mutant.apply_patch(false)?;
    let outcome = collect_prerequisites(ctx, version, target, bug.mutation.pre_start_line, &mutant, &tcs);
    mutant.apply_patch(true)?;
    outcome?;

    // Reduction owns the invariants: a bug whose buggy line falls
    // outside the candidate space is excluded here, gate left unset.
    let bug = ctx.store.bug(bug.bug_idx)?;
    match postprocess::process_bug(ctx.store, ctx.config, &ctx.args.subject, &bug, ctx.args.st_scale)
    {
        Ok(()) => {
            ctx.store.set_gate(bug.bug_idx, Gate::Prerequisites, true)?;
            info!(version, "prerequisite data extracted");
        }
        Err(err) => {
            error!(version, error = %format!("{err:#}"), "coverage reduction failed; bug excluded");
        }
    }
    Ok(())
}

fn collect_prerequisites(
    ctx: &WorkerCtx<'_>,
    version: &str,
    target: &str,
    mutated_line: u32,
    mutant: &Mutant,
    tcs: &[TestCaseRecord],
) -> Result<()> {
    if !ctx.build()? {
        bail!("mutant build failed during prerequisite extraction");
    }

    let testcases_dir = ctx.subject.testcases_dir();
    let timeout = ctx.test_timeout();
    let version_cov_dir = ctx.config.coverage_dir().join(version);
    std::fs::create_dir_all(&version_cov_dir)
        .with_context(|| format!("create {}", version_cov_dir.display()))?;

    // One instrumented run and one coverage report per test. Counters
    // are wiped between runs so each report is a single test's.
    for tc in tcs {
        let script = testcases_dir.join(&tc.tc_name);
        remove_gcda_files(&ctx.subject.repo_dir)?;
        let outcome = mutant.run_test(&script, timeout, &ctx.envs)?;
        if outcome != tc.outcome {
            ctx.store.set_tc_outcome(tc.bug_idx, tc.tc_idx, outcome)?;
        }
        ctx.collect_coverage(&version_cov_dir.join(format!("{}.json", tc.tc_name)))?;
    }

    // Failing tests get a backtrace from a breakpoint on the mutated
    // line; the scorer consumes these during reduction.
    let tcs = ctx.store.test_cases(tcs[0].bug_idx)?;
    for tc in tcs.iter().filter(|t| t.outcome == TestOutcome::Fail) {
        let script = testcases_dir.join(&tc.tc_name);
        let trace = ctx.capture_stacktrace(&script, target, mutated_line)?;
        if trace.is_empty() {
            warn!(version, tc = %tc.tc_name, "empty backtrace for failing test");
            continue;
        }
        ctx.store.set_tc_stacktrace(tc.bug_idx, tc.tc_idx, &trace)?;
    }
    Ok(())
}
