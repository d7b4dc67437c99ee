//! Persistent pipeline records.
//!
//! One [`BugRecord`] per mutant, enriched across stages; many
//! [`TestCaseRecord`]s and [`LineRecord`]s per bug, created by the
//! worker that runs the bug's suite and by coverage postprocessing
//! respectively.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one test-case execution against a mutant build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    /// Exit code 1: the oracle detected the fault.
    Fail,
    /// Exit code 0.
    Pass,
    /// Any other exit code (signal, timeout wrapper, abort).
    Crashed,
    /// Candidate correct test case: originally passing, later found to
    /// execute the buggy line. Excluded from scoring but kept.
    Cctc,
}

impl TestOutcome {
    /// Classify a raw exit code from the test script.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => TestOutcome::Pass,
            1 => TestOutcome::Fail,
            _ => TestOutcome::Crashed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestOutcome::Fail => "fail",
            TestOutcome::Pass => "pass",
            TestOutcome::Crashed => "crashed",
            TestOutcome::Cctc => "cctc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fail" => Some(TestOutcome::Fail),
            "pass" => Some(TestOutcome::Pass),
            "crashed" => Some(TestOutcome::Crashed),
            "cctc" => Some(TestOutcome::Cctc),
            _ => None,
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source span and text of a mutation, before and after, as reported
/// by the mutant generator's CSV ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationSite {
    pub operator: String,
    pub pre_start_line: u32,
    pub pre_start_col: u32,
    pub pre_end_line: u32,
    pub pre_end_col: u32,
    pub pre_text: String,
    pub post_start_line: u32,
    pub post_start_col: u32,
    pub post_end_line: u32,
    pub post_end_col: u32,
    pub post_text: String,
}

/// Canonical identity of one source line: `file#function#line`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub file: String,
    pub function: String,
    pub lineno: u32,
}

impl LineKey {
    pub fn new(file: impl Into<String>, function: impl Into<String>, lineno: u32) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            lineno,
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.file, self.function, self.lineno)
    }
}

/// One mutant tracked through the pipeline. Mirrors a `bug_info` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BugRecord {
    /// Store-assigned identity (0 before insertion).
    pub bug_idx: i64,
    pub subject: String,
    pub experiment_label: String,
    /// Mutant file name, e.g. `deflate.MUT123.c`.
    pub version: String,
    /// Subject-relative path of the mutated source file.
    pub target_code_file: String,

    // Pipeline gates, each owned by one stage. NULL until that stage
    // runs; set to true by the stage's worker on success.
    pub initial: Option<bool>,
    pub usable: Option<bool>,
    pub prerequisites: Option<bool>,
    pub selected_for_mbfl: Option<bool>,
    pub mutants_generated: Option<bool>,
    pub mbfl: Option<bool>,

    /// Terminal classification. A stage that rejects this record writes
    /// a stage-specific reason here and never touches the gates again.
    pub mutant_type: Option<String>,

    pub mutation: MutationSite,

    /// Buggy-line identity, resolved once during coverage
    /// postprocessing into the canonical `file#function#line` key.
    pub buggy_file: Option<String>,
    pub buggy_function: Option<String>,
    pub buggy_lineno: Option<u32>,

    // Coverage summary counters for quick filtering.
    pub num_failing_tcs: Option<u32>,
    pub num_passing_tcs: Option<u32>,
    pub num_ctcs: Option<u32>,
    pub num_total_lines: Option<u32>,
    pub num_candidate_lines: Option<u32>,
}

impl BugRecord {
    /// Read a gate by column.
    pub fn gate(&self, gate: crate::Gate) -> Option<bool> {
        use crate::Gate;
        match gate {
            Gate::Initial => self.initial,
            Gate::Usable => self.usable,
            Gate::Prerequisites => self.prerequisites,
            Gate::SelectedForMbfl => self.selected_for_mbfl,
            Gate::MutantsGenerated => self.mutants_generated,
            Gate::Mbfl => self.mbfl,
        }
    }

    /// The buggy line as a canonical key, if resolved.
    pub fn buggy_line_key(&self) -> Option<LineKey> {
        Some(LineKey::new(
            self.buggy_file.clone()?,
            self.buggy_function.clone()?,
            self.buggy_lineno?,
        ))
    }
}

/// One test case run against one bug. Mirrors a `tc_info` row.
///
/// Bit sequences carry their declared width explicitly: widths vary
/// between bugs and between the full and reduced spaces, so a width
/// must always travel with its value and is never inferred from
/// string length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseRecord {
    pub bug_idx: i64,
    pub tc_idx: u32,
    pub tc_name: String,
    pub outcome: TestOutcome,
    /// Derived during postprocessing; None until computed.
    pub relevant: Option<bool>,
    /// Full-space coverage as '0'/'1' text.
    pub full_bit_seq: Option<String>,
    pub full_bit_len: Option<u32>,
    /// Candidate-space coverage as '0'/'1' text.
    pub reduced_bit_seq: Option<String>,
    pub reduced_bit_len: Option<u32>,
    /// Raw backtrace text; failing tests only.
    pub stacktrace: Option<String>,
}

impl TestCaseRecord {
    pub fn new(bug_idx: i64, tc_idx: u32, tc_name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            bug_idx,
            tc_idx,
            tc_name: tc_name.into(),
            outcome,
            relevant: None,
            full_bit_seq: None,
            full_bit_len: None,
            reduced_bit_seq: None,
            reduced_bit_len: None,
            stacktrace: None,
        }
    }
}

/// One candidate line of a bug. Mirrors a `line_info` row; created
/// exactly once at coverage postprocessing time, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRecord {
    pub bug_idx: i64,
    /// Dense, order-preserving index in the reduced space.
    pub line_idx: u32,
    pub key: LineKey,
    pub is_buggy_line: bool,
    /// Stack-trace relevance features, written once by the scorer.
    pub st_relevance: Option<f64>,
    pub st_relevance_linear: Option<f64>,
    pub st_distance: Option<u32>,
}

/// One second-order mutant (mutant of a mutant). Mirrors a
/// `mutation_info` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    pub bug_idx: i64,
    pub mutant_idx: u32,
    pub targetting_file: String,
    pub mutation_dirname: String,
    pub mutant_filename: String,
    /// Candidate-line index this mutation lands on.
    pub line_idx: Option<u32>,
    pub mut_op: String,
    pub build_result: Option<bool>,
    /// Outcome-transition label from mutation testing, e.g. "f2p".
    pub result_transition: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_classification() {
        assert_eq!(TestOutcome::from_exit_code(0), TestOutcome::Pass);
        assert_eq!(TestOutcome::from_exit_code(1), TestOutcome::Fail);
        assert_eq!(TestOutcome::from_exit_code(139), TestOutcome::Crashed);
        assert_eq!(TestOutcome::from_exit_code(-9), TestOutcome::Crashed);
    }

    #[test]
    fn outcome_round_trips_as_str() {
        for o in [
            TestOutcome::Fail,
            TestOutcome::Pass,
            TestOutcome::Crashed,
            TestOutcome::Cctc,
        ] {
            assert_eq!(TestOutcome::parse(o.as_str()), Some(o));
        }
        assert_eq!(TestOutcome::parse("flaky"), None);
    }

    #[test]
    fn line_key_display_uses_hash_separator() {
        let key = LineKey::new("src/deflate.c", "deflate_stored", 1423);
        assert_eq!(key.to_string(), "src/deflate.c#deflate_stored#1423");
    }
}
