//! Experiment directory layout, slot topology and environment caps.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use mbfl_types::SlotId;

use crate::args::Args;

/// Resolved paths and limits for one engine or worker invocation.
///
/// Everything a run needs from the environment is captured here at
/// startup; nothing downstream reads `std::env` or mutates the process
/// environment.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Research-data root: `$RESEARCH_DATA`, or `~/mbfl_research_data`.
    pub research_data: PathBuf,
    /// `<research_data>/<experiment_label>/<subject>`.
    pub out_dir: PathBuf,
    /// Per-slot working trees live under here.
    pub working_env_dir: PathBuf,
    /// Subject repositories root: `<research_data>/subjects`.
    pub subjects_dir: PathBuf,
    /// Log directory for this run.
    pub log_dir: PathBuf,
    /// Datastore path.
    pub db_path: PathBuf,
    /// Slot topology for executors.
    pub slots: Vec<SlotId>,
    /// Per-stage selection caps from the environment, engine-side
    /// deterministic sampling. `--sample` overrides all of them.
    pub caps: StageCaps,
}

/// Optional per-stage caps, read once from the environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCaps {
    pub usability: Option<usize>,
    pub prerequisites: Option<usize>,
    pub mbfl: Option<usize>,
}

impl StageCaps {
    fn from_env() -> Self {
        Self {
            usability: read_cap("NUMBER_BUGS_TO_CHECK_FOR_USABILITY"),
            prerequisites: read_cap("NUMBER_BUGS_TO_CHECK_FOR_PREREQUISITES"),
            mbfl: read_cap("NUMBER_BUGS_TO_SELECT_FOR_MBFL"),
        }
    }
}

fn read_cap(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            debug!(name, raw, "ignoring unparsable cap variable");
            None
        }
    }
}

impl ExperimentConfig {
    pub fn resolve(args: &Args) -> Result<Self> {
        let research_data = match std::env::var_os("RESEARCH_DATA") {
            Some(v) => PathBuf::from(v),
            None => dirs::home_dir()
                .context("RESEARCH_DATA unset and no home directory to fall back to")?
                .join("mbfl_research_data"),
        };

        let out_dir = research_data
            .join(&args.experiment_label)
            .join(&args.subject);
        let working_env_dir = out_dir.join("working_env");
        let subjects_dir = research_data.join("subjects");
        let log_dir = research_data
            .join("logs")
            .join(&args.experiment_label)
            .join(&args.subject);
        let db_path = match &args.db {
            Some(p) => p.clone(),
            None => research_data.join(&args.experiment_label).join("mbfl.db"),
        };

        let slots = match &args.machines_file {
            Some(path) => parse_machines_file(path)?,
            None => local_slots(),
        };
        if slots.is_empty() {
            bail!("slot topology is empty");
        }

        Ok(Self {
            research_data,
            out_dir,
            working_env_dir,
            subjects_dir,
            log_dir,
            db_path,
            slots,
            caps: StageCaps::from_env(),
        })
    }

    /// The subject repository checkout for this experiment.
    pub fn subject_repo_dir(&self, subject: &str) -> PathBuf {
        self.subjects_dir.join(subject)
    }

    /// Where stage-1 output (generated mutants plus their CSV ledgers)
    /// lives.
    pub fn generated_mutants_dir(&self) -> PathBuf {
        self.out_dir.join("generated_mutants")
    }

    /// Per-bug coverage artifacts produced during prerequisite testing.
    pub fn coverage_dir(&self) -> PathBuf {
        self.out_dir.join("coverage")
    }

    /// Second-order mutants generated during stage 5.
    pub fn mutant_mutants_dir(&self) -> PathBuf {
        self.out_dir.join("mutant_mutants")
    }

    /// Function-boundary listing produced by the extractor for this
    /// subject.
    pub fn boundaries_file(&self) -> PathBuf {
        self.out_dir.join("function_boundaries.txt")
    }
}

/// Parse a `machine core home_dir` topology file. Blank lines and '#'
/// comments are skipped.
fn parse_machines_file(path: &Path) -> Result<Vec<SlotId>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read machines file {}", path.display()))?;
    let mut slots = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (machine, core, home) = match (fields.next(), fields.next(), fields.next()) {
            (Some(m), Some(c), Some(h)) => (m, c, h),
            _ => bail!(
                "{}:{}: expected `machine core home_dir`, got {line:?}",
                path.display(),
                lineno + 1
            ),
        };
        let core: u32 = core.parse().with_context(|| {
            format!("{}:{}: core index {core:?}", path.display(), lineno + 1)
        })?;
        slots.push(SlotId::new(machine, core, home));
    }
    Ok(slots)
}

/// Default topology: one slot per available local core.
fn local_slots() -> Vec<SlotId> {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    (0..cores as u32)
        .map(|core| SlotId::new("localhost", core, home.clone()))
        .collect()
}
