//! Stage 1: mutant generation.
//!
//! Dispatches one generator task per target source file, then harvests
//! the CSV ledgers the generator wrote and registers every new mutant
//! as a bug record with its `initial` gate set. Registration is the one
//! gate flip an engine performs itself here: the generator worker only
//! produces files, it never sees the datastore rows it will create.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use mbfl_types::{BugRecord, Stage};

use crate::args::WorkerKind;
use crate::executor::WorkerTask;
use crate::ledger::read_mutation_ledger;

use super::{dispatch, mutant_dirname, EngineCtx};

pub(super) fn run(ctx: &EngineCtx<'_>) -> Result<()> {
    let stage = Stage::MutantGeneration;
    let mutants_dir = ctx.config.generated_mutants_dir();
    std::fs::create_dir_all(&mutants_dir)
        .with_context(|| format!("create {}", mutants_dir.display()))?;

    let tasks: Vec<WorkerTask> = ctx
        .subject
        .config
        .target_files
        .iter()
        .map(|target| WorkerTask {
            worker: WorkerKind::MutantGenerator,
            version: None,
            target_file: Some(target.clone()),
            artifact: None,
            needs_configuration: true,
        })
        .collect();

    let report = dispatch(ctx, stage, tasks)?;
    info!(
        targets = ctx.subject.config.target_files.len(),
        succeeded = report.succeeded,
        failed = report.failed,
        "mutant generation batch complete"
    );

    register_generated_mutants(ctx, &mutants_dir)
}

/// Read every target file's ledger and insert one bug record per
/// mutant, skipping versions already registered so repeated engine runs
/// are additive.
fn register_generated_mutants(ctx: &EngineCtx<'_>, mutants_dir: &Path) -> Result<()> {
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for target in &ctx.subject.config.target_files {
        let target_dir = mutants_dir.join(mutant_dirname(target));
        let ledger_path = target_dir.join(ledger_filename(target));
        if !ledger_path.exists() {
            warn!(
                target,
                ledger = %ledger_path.display(),
                "no ledger produced for target file"
            );
            continue;
        }

        for entry in read_mutation_ledger(&ledger_path)? {
            let exists = ctx
                .store
                .bug_by_version(&ctx.args.subject, &ctx.args.experiment_label, &entry.mutant_name)
                .is_ok();
            if exists {
                skipped += 1;
                continue;
            }
            let bug = BugRecord {
                subject: ctx.args.subject.clone(),
                experiment_label: ctx.args.experiment_label.clone(),
                version: entry.mutant_name.clone(),
                target_code_file: target.clone(),
                initial: Some(true),
                mutation: entry.site,
                ..BugRecord::default()
            };
            ctx.store
                .insert_bug(&bug)
                .with_context(|| format!("register mutant {}", entry.mutant_name))?;
            inserted += 1;
        }
    }

    info!(inserted, skipped, "mutants registered");
    Ok(())
}

/// Ledger name convention of the generator: `<stem>_mut_db.csv` beside
/// the mutant files, e.g. `deflate_mut_db.csv` for `src/deflate.c`.
pub(crate) fn ledger_filename(target_file: &str) -> String {
    let stem = Path::new(target_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(target_file);
    format!("{stem}_mut_db.csv")
}

#[cfg(test)]
mod tests {
    use super::ledger_filename;

    #[test]
    fn ledger_name_comes_from_the_file_stem() {
        assert_eq!(ledger_filename("src/deflate.c"), "deflate_mut_db.csv");
        assert_eq!(ledger_filename("inflate.c"), "inflate_mut_db.csv");
    }
}
