//! `bug_info` reads and writes.

use anyhow::{Context, Result};
use rusqlite::{params, Row};
use tracing::debug;

use mbfl_types::{BugRecord, Gate, LineKey, MutationSite, Stage};

use crate::Store;

/// Coverage summary counters written once at postprocessing time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageSummary {
    pub num_failing_tcs: u32,
    pub num_passing_tcs: u32,
    pub num_ctcs: u32,
    pub num_total_lines: u32,
    pub num_candidate_lines: u32,
}

const BUG_COLUMNS: &str = "\
bug_idx, subject, experiment_label, version, target_code_file, \
initial, usable, prerequisites, selected_for_mbfl, mutants_generated, mbfl, \
mutant_type, \
mut_op, pre_start_line, pre_start_col, pre_end_line, pre_end_col, pre_text, \
post_start_line, post_start_col, post_end_line, post_end_col, post_text, \
buggy_file, buggy_function, buggy_lineno, \
num_failing_tcs, num_passing_tcs, num_ctcs, num_total_lines, num_candidate_lines";

fn bug_from_row(row: &Row<'_>) -> rusqlite::Result<BugRecord> {
    Ok(BugRecord {
        bug_idx: row.get(0)?,
        subject: row.get(1)?,
        experiment_label: row.get(2)?,
        version: row.get(3)?,
        target_code_file: row.get(4)?,
        initial: row.get(5)?,
        usable: row.get(6)?,
        prerequisites: row.get(7)?,
        selected_for_mbfl: row.get(8)?,
        mutants_generated: row.get(9)?,
        mbfl: row.get(10)?,
        mutant_type: row.get(11)?,
        mutation: MutationSite {
            operator: row.get(12)?,
            pre_start_line: row.get(13)?,
            pre_start_col: row.get(14)?,
            pre_end_line: row.get(15)?,
            pre_end_col: row.get(16)?,
            pre_text: row.get(17)?,
            post_start_line: row.get(18)?,
            post_start_col: row.get(19)?,
            post_end_line: row.get(20)?,
            post_end_col: row.get(21)?,
            post_text: row.get(22)?,
        },
        buggy_file: row.get(23)?,
        buggy_function: row.get(24)?,
        buggy_lineno: row.get(25)?,
        num_failing_tcs: row.get(26)?,
        num_passing_tcs: row.get(27)?,
        num_ctcs: row.get(28)?,
        num_total_lines: row.get(29)?,
        num_candidate_lines: row.get(30)?,
    })
}

impl Store {
    /// Insert a new bug record and return its assigned `bug_idx`.
    pub fn insert_bug(&self, bug: &BugRecord) -> Result<i64> {
        self.conn()
            .execute(
                "INSERT INTO bug_info (subject, experiment_label, version, target_code_file, \
                 initial, mutant_type, \
                 mut_op, pre_start_line, pre_start_col, pre_end_line, pre_end_col, pre_text, \
                 post_start_line, post_start_col, post_end_line, post_end_col, post_text, \
                 buggy_file, buggy_function, buggy_lineno) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                 ?16, ?17, ?18, ?19, ?20)",
                params![
                    bug.subject,
                    bug.experiment_label,
                    bug.version,
                    bug.target_code_file,
                    bug.initial,
                    bug.mutant_type,
                    bug.mutation.operator,
                    bug.mutation.pre_start_line,
                    bug.mutation.pre_start_col,
                    bug.mutation.pre_end_line,
                    bug.mutation.pre_end_col,
                    bug.mutation.pre_text,
                    bug.mutation.post_start_line,
                    bug.mutation.post_start_col,
                    bug.mutation.post_end_line,
                    bug.mutation.post_end_col,
                    bug.mutation.post_text,
                    bug.buggy_file,
                    bug.buggy_function,
                    bug.buggy_lineno,
                ],
            )
            .with_context(|| format!("insert bug {}", bug.version))?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Load one bug by index.
    pub fn bug(&self, bug_idx: i64) -> Result<BugRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {BUG_COLUMNS} FROM bug_info WHERE bug_idx = ?1"),
                params![bug_idx],
                bug_from_row,
            )
            .with_context(|| format!("load bug {bug_idx}"))
    }

    /// Load one bug by its (subject, experiment, version) identity.
    pub fn bug_by_version(
        &self,
        subject: &str,
        experiment_label: &str,
        version: &str,
    ) -> Result<BugRecord> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {BUG_COLUMNS} FROM bug_info \
                     WHERE subject = ?1 AND experiment_label = ?2 AND version = ?3"
                ),
                params![subject, experiment_label, version],
                bug_from_row,
            )
            .with_context(|| format!("load bug {subject}/{experiment_label}/{version}"))
    }

    /// Bugs satisfying a stage's entry predicate: every required gate
    /// `= TRUE` and the stage's own gate `IS NULL`. Records rejected by
    /// an earlier stage carry a NULL gate there and never match.
    pub fn bugs_for_stage(
        &self,
        stage: Stage,
        subject: &str,
        experiment_label: &str,
    ) -> Result<Vec<BugRecord>> {
        let mut predicate = String::new();
        for gate in stage.required_gates() {
            predicate.push_str(&format!(" AND {} IS TRUE", gate.column()));
        }
        predicate.push_str(&format!(" AND {} IS NULL", stage.gate().column()));

        let sql = format!(
            "SELECT {BUG_COLUMNS} FROM bug_info \
             WHERE subject = ?1 AND experiment_label = ?2{predicate} \
             ORDER BY bug_idx"
        );
        let mut stmt = self.conn().prepare(&sql).context("prepare stage query")?;
        let rows = stmt
            .query_map(params![subject, experiment_label], bug_from_row)
            .context("query bugs for stage")?;
        let bugs: Result<Vec<_>, _> = rows.collect();
        let bugs = bugs.context("read bug rows")?;
        debug!(stage = %stage, count = bugs.len(), "stage predicate matched");
        Ok(bugs)
    }

    /// Flip a gate. Gates are monotonic: callers only ever set `true`
    /// on success; rejection goes through [`Store::set_mutant_type`].
    pub fn set_gate(&self, bug_idx: i64, gate: Gate, value: bool) -> Result<()> {
        let n = self
            .conn()
            .execute(
                &format!("UPDATE bug_info SET {} = ?1 WHERE bug_idx = ?2", gate.column()),
                params![value, bug_idx],
            )
            .with_context(|| format!("set gate {gate} for bug {bug_idx}"))?;
        anyhow::ensure!(n == 1, "gate update touched {n} rows for bug {bug_idx}");
        Ok(())
    }

    /// Record a terminal, stage-specific rejection reason. The stage's
    /// gate stays unset, permanently excluding the record from later
    /// stage predicates.
    pub fn set_mutant_type(&self, bug_idx: i64, mutant_type: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE bug_info SET mutant_type = ?1 WHERE bug_idx = ?2",
                params![mutant_type, bug_idx],
            )
            .with_context(|| format!("set mutant_type for bug {bug_idx}"))?;
        Ok(())
    }

    /// Resolve the buggy line identity (done once during coverage
    /// postprocessing).
    pub fn set_buggy_line(&self, bug_idx: i64, key: &LineKey) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE bug_info SET buggy_file = ?1, buggy_function = ?2, buggy_lineno = ?3 \
                 WHERE bug_idx = ?4",
                params![key.file, key.function, key.lineno, bug_idx],
            )
            .with_context(|| format!("set buggy line for bug {bug_idx}"))?;
        Ok(())
    }

    /// Write the quick-filter coverage counters.
    pub fn set_coverage_summary(&self, bug_idx: i64, summary: &CoverageSummary) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE bug_info SET num_failing_tcs = ?1, num_passing_tcs = ?2, \
                 num_ctcs = ?3, num_total_lines = ?4, num_candidate_lines = ?5 \
                 WHERE bug_idx = ?6",
                params![
                    summary.num_failing_tcs,
                    summary.num_passing_tcs,
                    summary.num_ctcs,
                    summary.num_total_lines,
                    summary.num_candidate_lines,
                    bug_idx,
                ],
            )
            .with_context(|| format!("set coverage summary for bug {bug_idx}"))?;
        Ok(())
    }

    /// Cascading purge of a whole subject/experiment: removes the bug
    /// rows and, through foreign keys, their tc/line/mutation rows.
    pub fn purge_experiment(&self, subject: &str, experiment_label: &str) -> Result<usize> {
        let n = self
            .conn()
            .execute(
                "DELETE FROM bug_info WHERE subject = ?1 AND experiment_label = ?2",
                params![subject, experiment_label],
            )
            .with_context(|| format!("purge {subject}/{experiment_label}"))?;
        debug!(subject, experiment_label, purged = n, "experiment purged");
        Ok(n)
    }
}
