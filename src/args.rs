use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use mbfl_types::Stage;

/// Stage engine selector. Engines evaluate the stage's entry predicate,
/// build one task per eligible mutant and hand the batch to an executor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Run the mutant generator and register discovered mutants.
    MutantGeneration,
    /// Test initially-accepted mutants for usability.
    UsableSelection,
    /// Run the full suite per bug and extract coverage prerequisites.
    PrerequisiteExtraction,
    /// Pick the MBFL experiment subset.
    MbflSelection,
    /// Generate second-order mutants for selected bugs.
    MutantMutantGeneration,
    /// Run mutation testing and extract result transitions.
    MbflExtraction,
}

impl EngineKind {
    pub fn stage(&self) -> Stage {
        match self {
            EngineKind::MutantGeneration => Stage::MutantGeneration,
            EngineKind::UsableSelection => Stage::UsableSelection,
            EngineKind::PrerequisiteExtraction => Stage::PrerequisiteExtraction,
            EngineKind::MbflSelection => Stage::MbflSelection,
            EngineKind::MutantMutantGeneration => Stage::MutantMutantGeneration,
            EngineKind::MbflExtraction => Stage::MbflExtraction,
        }
    }
}

/// Worker entry points. Executors invoke this binary again with one of
/// these on a slot; users normally never pass them by hand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum WorkerKind {
    /// Run the external mutant generator for one target file.
    MutantGenerator,
    /// Test one mutant for usability.
    UsableTester,
    /// Run the suite with coverage for one bug and postprocess it.
    PrerequisiteTester,
    /// Generate second-order mutants for one bug.
    MutantMutantGenerator,
    /// Run mutation testing for one bug.
    MbflTester,
}

#[derive(Debug, Parser)]
#[command(author, about, disable_version_flag = true)]
pub struct Args {
    /// Increase output verbosity.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Enable debug-level logging.
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,

    /// Subject under experiment (directory name under the subjects root).
    #[arg(short, long)]
    pub subject: String,

    /// Label for this experiment run; partitions output dirs, logs and
    /// datastore rows.
    #[arg(short = 'l', long)]
    pub experiment_label: String,

    /// Stage engine to run. Mutually exclusive with --worker.
    #[arg(short, long, value_enum)]
    pub engine: Option<EngineKind>,

    /// Worker entry point, normally supplied by an executor.
    #[arg(long, value_enum, hide = true)]
    pub worker: Option<WorkerKind>,

    /// Dispatch tasks to remote slots over ssh/rsync instead of local
    /// subprocesses.
    #[arg(long, default_value_t = false)]
    pub remote: bool,

    /// Slot topology file (`machine core home_dir` per line; '#'
    /// comments allowed). Defaults to one slot per local core.
    #[arg(long, value_name = "PATH")]
    pub machines_file: Option<PathBuf>,

    /// Datastore path (defaults to <research-data>/<label>/mbfl.db).
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Cap the number of eligible mutants handled by this engine run.
    /// The subset is a deterministic sample keyed by --sample-seed.
    #[arg(long, value_name = "N")]
    pub sample: Option<usize>,

    /// Seed used for deterministic mutant sampling.
    #[arg(long, default_value_t = 0)]
    pub sample_seed: u64,

    /// Per-test-case timeout in seconds.
    #[arg(long, default_value_t = 60)]
    pub test_timeout_secs: u64,

    /// Number of retries for artifact copies to remote slots.
    #[arg(long, default_value_t = 1)]
    pub copy_retries: usize,

    /// Backoff between copy retries in milliseconds.
    #[arg(long, default_value_t = 250)]
    pub copy_retry_backoff_ms: u64,

    /// Scale parameter of the gaussian stack-trace relevance score.
    #[arg(long, default_value_t = 1.0)]
    pub st_scale: f64,

    // Worker-mode arguments, filled in by the dispatching executor.
    /// Mutant version (file name) this worker operates on.
    #[arg(long, value_name = "NAME", hide = true)]
    pub version: Option<String>,

    /// Subject-relative path of the mutated source file.
    #[arg(long, value_name = "PATH", hide = true)]
    pub target_file: Option<String>,

    /// Machine this worker was dispatched to.
    #[arg(long, value_name = "HOST", hide = true)]
    pub machine: Option<String>,

    /// Core index on the dispatched machine.
    #[arg(long, value_name = "N", hide = true)]
    pub core: Option<u32>,

    /// Run the subject configure script before building.
    #[arg(long, default_value_t = false, hide = true)]
    pub needs_configuration: bool,
}

// Re-export RetryConfig from the shared types crate
pub use mbfl_types::RetryConfig;

/// Extension trait to create RetryConfig from Args.
pub trait RetryConfigExt {
    fn from_args(args: &Args) -> RetryConfig;
}

impl RetryConfigExt for RetryConfig {
    fn from_args(args: &Args) -> RetryConfig {
        RetryConfig::new(args.copy_retries, args.copy_retry_backoff_ms)
    }
}

impl Args {
    /// Validate CLI arguments for conflicts and requirements.
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.engine.is_some() && self.worker.is_some() {
            return Err("--engine and --worker are mutually exclusive".to_string());
        }
        if self.engine.is_none() && self.worker.is_none() {
            return Err("one of --engine or --worker is required".to_string());
        }

        if self.worker.is_some() {
            if self.machine.is_none() || self.core.is_none() {
                return Err("worker mode requires --machine and --core".to_string());
            }
            let needs_mutant = !matches!(self.worker, Some(WorkerKind::MutantGenerator));
            if needs_mutant && (self.version.is_none() || self.target_file.is_none()) {
                return Err("this worker requires --version and --target-file".to_string());
            }
        }

        if self.engine.is_some() {
            if self.version.is_some() || self.target_file.is_some() {
                return Err(
                    "--version/--target-file are worker-mode arguments; engines select mutants \
                     through the datastore"
                        .to_string(),
                );
            }
            if self.remote && self.machines_file.is_none() {
                return Err("--remote requires --machines-file".to_string());
            }
        }

        if self.test_timeout_secs == 0 {
            return Err("--test-timeout-secs must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(
            std::iter::once("mbfl-pipeline").chain(argv.iter().copied()),
        )
    }

    #[test]
    fn engine_and_worker_are_exclusive() {
        let args = parse(&[
            "-s",
            "zlib_ng",
            "-l",
            "exp1",
            "--engine",
            "usable-selection",
            "--worker",
            "usable-tester",
            "--machine",
            "localhost",
            "--core",
            "0",
            "--version",
            "deflate.MUT1.c",
            "--target-file",
            "src/deflate.c",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn worker_mode_requires_slot_identity() {
        let args = parse(&["-s", "zlib_ng", "-l", "exp1", "--worker", "usable-tester"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn remote_engine_requires_machines_file() {
        let args = parse(&[
            "-s",
            "zlib_ng",
            "-l",
            "exp1",
            "--engine",
            "usable-selection",
            "--remote",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn plain_engine_invocation_validates() {
        let args = parse(&["-s", "zlib_ng", "-l", "exp1", "--engine", "mbfl-selection"]);
        assert!(args.validate().is_ok());
        assert_eq!(
            args.engine.map(|e| e.stage()),
            Some(Stage::MbflSelection)
        );
    }
}
