//! Pipeline stage state machine.
//!
//! Each mutant advances through six gates, each owned by exactly one
//! stage. A gate is tri-state (`NULL` / `FALSE` / `TRUE` in the store,
//! `Option<bool>` in memory) and monotonic: a stage that rejects a
//! record writes a terminal `mutant_type` string and leaves its gate
//! unset instead of resetting an earlier one. In practice only `NULL`
//! and `TRUE` are observed; the tri-state shape is preserved because it
//! is the on-disk contract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One gate column on a bug record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Initial,
    Usable,
    Prerequisites,
    SelectedForMbfl,
    MutantsGenerated,
    Mbfl,
}

impl Gate {
    /// Column name in the `bug_info` table.
    pub fn column(&self) -> &'static str {
        match self {
            Gate::Initial => "initial",
            Gate::Usable => "usable",
            Gate::Prerequisites => "prerequisites",
            Gate::SelectedForMbfl => "selected_for_mbfl",
            Gate::MutantsGenerated => "mutants_generated",
            Gate::Mbfl => "mbfl",
        }
    }

    /// All gates in pipeline order.
    pub fn all() -> &'static [Gate] {
        &[
            Gate::Initial,
            Gate::Usable,
            Gate::Prerequisites,
            Gate::SelectedForMbfl,
            Gate::MutantsGenerated,
            Gate::Mbfl,
        ]
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// A pipeline stage. Resolved once at startup from the CLI; replaces
/// the string-keyed engine registry of earlier revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stage 1: run the mutant generator and create bug records.
    MutantGeneration,
    /// Stage 2: select initially-accepted mutants and test usability.
    UsableSelection,
    /// Stage 3: run the full suite and extract coverage prerequisites.
    PrerequisiteExtraction,
    /// Stage 4: pick the MBFL experiment subset.
    MbflSelection,
    /// Stage 5: generate second-order mutants for selected bugs.
    MutantMutantGeneration,
    /// Stage 6: run mutation testing and extract result transitions.
    MbflExtraction,
}

impl Stage {
    /// The gate this stage owns and flips to true on worker success.
    ///
    /// Stage 1 owns `initial`: it both creates records and marks the
    /// ones whose failure signature is appropriate.
    pub fn gate(&self) -> Gate {
        match self {
            Stage::MutantGeneration => Gate::Initial,
            Stage::UsableSelection => Gate::Usable,
            Stage::PrerequisiteExtraction => Gate::Prerequisites,
            Stage::MbflSelection => Gate::SelectedForMbfl,
            Stage::MutantMutantGeneration => Gate::MutantsGenerated,
            Stage::MbflExtraction => Gate::Mbfl,
        }
    }

    /// Gates that must already be true for a record to enter this stage.
    ///
    /// The entry predicate is: every listed gate `= TRUE`, and the owned
    /// gate `IS NULL`. A record carrying a terminal `mutant_type` from a
    /// failed stage never satisfies later predicates because its gate
    /// stays NULL forever.
    pub fn required_gates(&self) -> &'static [Gate] {
        match self {
            Stage::MutantGeneration => &[],
            Stage::UsableSelection => &[Gate::Initial],
            Stage::PrerequisiteExtraction => &[Gate::Initial, Gate::Usable],
            Stage::MbflSelection => &[Gate::Initial, Gate::Usable, Gate::Prerequisites],
            Stage::MutantMutantGeneration => &[
                Gate::Initial,
                Gate::Usable,
                Gate::Prerequisites,
                Gate::SelectedForMbfl,
            ],
            Stage::MbflExtraction => &[
                Gate::Initial,
                Gate::Usable,
                Gate::Prerequisites,
                Gate::SelectedForMbfl,
                Gate::MutantsGenerated,
            ],
        }
    }

    /// Short name used in directory names and log lines.
    pub fn short_name(&self) -> &'static str {
        match self {
            Stage::MutantGeneration => "mutant_generation",
            Stage::UsableSelection => "usable_selection",
            Stage::PrerequisiteExtraction => "prerequisite_extraction",
            Stage::MbflSelection => "mbfl_selection",
            Stage::MutantMutantGeneration => "mutant_mutant_generation",
            Stage::MbflExtraction => "mbfl_extraction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}
