//! Stage engines.
//!
//! An engine is the driver side of one pipeline stage: it evaluates the
//! stage's entry predicate against the datastore, optionally caps the
//! eligible set by deterministic sampling, builds one task per mutant
//! and hands the batch to an executor. Engines never flip gates to
//! true; that is the dispatched worker's job when its stage work
//! succeeds.

mod generation;

pub(crate) use generation::ledger_filename;

use anyhow::{Context, Result};
use tracing::{info, warn};

use mbfl_store::Store;
use mbfl_types::{BugRecord, RetryConfig, Stage};

use crate::args::{Args, EngineKind, RetryConfigExt, WorkerKind};
use crate::config::ExperimentConfig;
use crate::executor::{
    executor_for, BatchReport, ExecContext, ExecutorKind, WorkerTask,
};
use crate::subject::Subject;

pub struct EngineCtx<'a> {
    pub args: &'a Args,
    pub config: &'a ExperimentConfig,
    pub subject: &'a Subject,
    pub store: &'a Store,
}

/// Run one engine invocation to completion.
pub fn run(kind: EngineKind, ctx: &EngineCtx<'_>) -> Result<()> {
    info!(engine = ?kind, subject = %ctx.args.subject, "engine starting");
    match kind {
        EngineKind::MutantGeneration => generation::run(ctx),
        EngineKind::UsableSelection => run_tested_stage(
            ctx,
            Stage::UsableSelection,
            WorkerKind::UsableTester,
            ctx.config.caps.usability,
        ),
        EngineKind::PrerequisiteExtraction => run_tested_stage(
            ctx,
            Stage::PrerequisiteExtraction,
            WorkerKind::PrerequisiteTester,
            ctx.config.caps.prerequisites,
        ),
        EngineKind::MbflSelection => run_selection(ctx),
        EngineKind::MutantMutantGeneration => run_tested_stage(
            ctx,
            Stage::MutantMutantGeneration,
            WorkerKind::MutantMutantGenerator,
            None,
        ),
        EngineKind::MbflExtraction => run_tested_stage(
            ctx,
            Stage::MbflExtraction,
            WorkerKind::MbflTester,
            None,
        ),
    }
}

/// The common shape of stages 2, 3, 5 and 6: predicate, sample, one
/// task per mutant, dispatch.
fn run_tested_stage(
    ctx: &EngineCtx<'_>,
    stage: Stage,
    worker: WorkerKind,
    env_cap: Option<usize>,
) -> Result<()> {
    let eligible = eligible_bugs(ctx, stage, env_cap)?;
    if eligible.is_empty() {
        warn!(stage = %stage, "no eligible mutants; nothing to dispatch");
        return Ok(());
    }

    let tasks: Vec<WorkerTask> = eligible
        .iter()
        .map(|bug| WorkerTask {
            worker,
            version: Some(bug.version.clone()),
            target_file: Some(bug.target_code_file.clone()),
            artifact: Some(mutant_artifact_path(ctx, bug)),
            needs_configuration: true,
        })
        .collect();

    let report = dispatch(ctx, stage, tasks)?;
    info!(
        stage = %stage,
        succeeded = report.succeeded,
        failed = report.failed,
        abandoned = report.abandoned,
        "stage batch complete"
    );
    Ok(())
}

/// Stage 4 runs no worker: it is a pure selection over records that
/// already carry full prerequisite data. The engine flips this one gate
/// itself.
fn run_selection(ctx: &EngineCtx<'_>) -> Result<()> {
    let stage = Stage::MbflSelection;
    let selected = eligible_bugs(ctx, stage, ctx.config.caps.mbfl)?;
    for bug in &selected {
        ctx.store
            .set_gate(bug.bug_idx, stage.gate(), true)
            .with_context(|| format!("select bug {} for mbfl", bug.version))?;
    }
    info!(selected = selected.len(), "mbfl subset selected");
    Ok(())
}

/// Evaluate the stage predicate and apply the sampling cap:
/// `--sample` wins, then the stage's environment cap, else everything.
fn eligible_bugs(
    ctx: &EngineCtx<'_>,
    stage: Stage,
    env_cap: Option<usize>,
) -> Result<Vec<BugRecord>> {
    let bugs = ctx.store.bugs_for_stage(
        stage,
        &ctx.args.subject,
        &ctx.args.experiment_label,
    )?;
    let cap = ctx.args.sample.or(env_cap);
    Ok(match cap {
        Some(n) if n < bugs.len() => {
            let sampled = deterministic_sample(bugs, n, ctx.args.sample_seed);
            info!(stage = %stage, sampled = sampled.len(), seed = ctx.args.sample_seed, "eligible set capped");
            sampled
        }
        _ => bugs,
    })
}

/// Deterministic sample of `n` records: hash each version under the
/// seed, sort by (hash, version), truncate, restore version order.
fn deterministic_sample(bugs: Vec<BugRecord>, n: usize, seed: u64) -> Vec<BugRecord> {
    let mut scored: Vec<(u64, BugRecord)> = bugs
        .into_iter()
        .map(|bug| (fnv1a64(seed, &bug.version), bug))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.version.cmp(&b.1.version)));
    scored.truncate(n);
    let mut out: Vec<BugRecord> = scored.into_iter().map(|(_h, bug)| bug).collect();
    out.sort_by(|a, b| a.version.cmp(&b.version));
    out
}

pub(crate) fn fnv1a64(seed: u64, s: &str) -> u64 {
    let mut hash = 0xcbf29ce484222325u64 ^ seed;
    for b in s.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Mutant directories are keyed by the target file with '/' replaced
/// by '#', one flat directory per mutated source file.
pub(crate) fn mutant_dirname(target_code_file: &str) -> String {
    target_code_file.replace('/', "#")
}

fn mutant_artifact_path(ctx: &EngineCtx<'_>, bug: &BugRecord) -> std::path::PathBuf {
    ctx.config
        .generated_mutants_dir()
        .join(mutant_dirname(&bug.target_code_file))
        .join(&bug.version)
}

pub(crate) fn dispatch(
    ctx: &EngineCtx<'_>,
    stage: Stage,
    tasks: Vec<WorkerTask>,
) -> Result<BatchReport> {
    let exec_ctx = ExecContext {
        subject: ctx.args.subject.clone(),
        experiment_label: ctx.args.experiment_label.clone(),
        stage,
        working_env_dir: ctx.config.working_env_dir.clone(),
        subject_repo_dir: ctx.subject.repo_dir.clone(),
        db_path: ctx.config.db_path.clone(),
        slots: ctx.config.slots.clone(),
        retry: RetryConfig::from_args(ctx.args),
        test_timeout_secs: ctx.args.test_timeout_secs,
    };
    let kind = if ctx.args.remote {
        ExecutorKind::Remote
    } else {
        ExecutorKind::Local
    };
    executor_for(kind).run_batch(&exec_ctx, tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug(version: &str) -> BugRecord {
        BugRecord {
            version: version.into(),
            ..BugRecord::default()
        }
    }

    #[test]
    fn sampling_is_deterministic_and_order_preserving() {
        let make = || {
            vec![
                bug("deflate.MUT1.c"),
                bug("deflate.MUT2.c"),
                bug("deflate.MUT3.c"),
                bug("inflate.MUT4.c"),
                bug("trees.MUT5.c"),
            ]
        };

        let a = deterministic_sample(make(), 3, 42);
        let b = deterministic_sample(make(), 3, 42);
        assert_eq!(
            a.iter().map(|x| &x.version).collect::<Vec<_>>(),
            b.iter().map(|x| &x.version).collect::<Vec<_>>()
        );
        assert_eq!(a.len(), 3);
        // Output comes back in version order regardless of hash order.
        let versions: Vec<_> = a.iter().map(|x| x.version.clone()).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn different_seeds_pick_different_subsets() {
        let make = || (0..32).map(|i| bug(&format!("f.MUT{i}.c"))).collect::<Vec<_>>();
        let a: Vec<_> = deterministic_sample(make(), 8, 1)
            .into_iter()
            .map(|b| b.version)
            .collect();
        let b: Vec<_> = deterministic_sample(make(), 8, 2)
            .into_iter()
            .map(|b| b.version)
            .collect();
        assert_ne!(a, b);
    }

    #[test]
    fn mutant_dirname_flattens_paths() {
        assert_eq!(mutant_dirname("src/deflate.c"), "src#deflate.c");
        assert_eq!(mutant_dirname("deflate.c"), "deflate.c");
    }
}
