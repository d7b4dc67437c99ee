//! MBFL experiment pipeline CLI.
//!
//! One binary, two faces: `--engine <stage>` runs a stage driver that
//! selects eligible mutants and dispatches them across slots;
//! `--worker <kind>` (normally invoked by an executor, not by hand)
//! does the per-mutant work on one (machine, core) slot.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use mbfl_pipeline::args::Args;
use mbfl_pipeline::config::ExperimentConfig;
use mbfl_pipeline::engine::{self, EngineCtx};
use mbfl_pipeline::logging;
use mbfl_pipeline::subject::Subject;
use mbfl_pipeline::worker;
use mbfl_store::Store;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    if let Err(msg) = args.validate() {
        bail!("{msg}");
    }

    let config = ExperimentConfig::resolve(&args)?;
    logging::init(&config.log_dir, args.verbose, args.debug)?;
    info!(
        subject = %args.subject,
        experiment_label = %args.experiment_label,
        db = %config.db_path.display(),
        "pipeline starting"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let store = Store::open(&config.db_path)?;

    if let Some(kind) = args.engine {
        std::fs::create_dir_all(&config.out_dir)
            .with_context(|| format!("create {}", config.out_dir.display()))?;
        let subject = Subject::load(&args.subject, &config.subject_repo_dir(&args.subject))?;
        let ctx = EngineCtx {
            args: &args,
            config: &config,
            subject: &subject,
            store: &store,
        };
        engine::run(kind, &ctx)
    } else if let Some(kind) = args.worker {
        worker::run(kind, &args, &config, &store)
    } else {
        // validate() guarantees one of the two is present.
        bail!("one of --engine or --worker is required");
    }
}
