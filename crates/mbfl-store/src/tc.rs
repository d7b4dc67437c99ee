//! `tc_info` reads and writes.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Row};

use mbfl_types::{TestCaseRecord, TestOutcome};

use crate::Store;

const TC_COLUMNS: &str = "\
bug_idx, tc_idx, tc_name, tc_result, relevant_tcs, \
full_bit_seq, full_bit_len, reduced_bit_seq, reduced_bit_len, stacktrace";

fn tc_from_row(row: &Row<'_>) -> rusqlite::Result<TestCaseRecord> {
    let outcome_str: String = row.get(3)?;
    let outcome = TestOutcome::parse(&outcome_str).unwrap_or(TestOutcome::Crashed);
    Ok(TestCaseRecord {
        bug_idx: row.get(0)?,
        tc_idx: row.get(1)?,
        tc_name: row.get(2)?,
        outcome,
        relevant: row.get(4)?,
        full_bit_seq: row.get(5)?,
        full_bit_len: row.get(6)?,
        reduced_bit_seq: row.get(7)?,
        reduced_bit_len: row.get(8)?,
        stacktrace: row.get(9)?,
    })
}

impl Store {
    /// Batch-insert the test-case rows of one bug. Rows are created
    /// once by the worker that ran the suite and updated in place
    /// afterwards, never replaced.
    pub fn insert_test_cases(&self, tcs: &[TestCaseRecord]) -> Result<()> {
        let mut stmt = self
            .conn()
            .prepare(
                "INSERT INTO tc_info (bug_idx, tc_idx, tc_name, tc_result, stacktrace) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .context("prepare tc insert")?;
        for tc in tcs {
            stmt.execute(params![
                tc.bug_idx,
                tc.tc_idx,
                tc.tc_name,
                tc.outcome.as_str(),
                tc.stacktrace,
            ])
            .with_context(|| format!("insert tc {} for bug {}", tc.tc_idx, tc.bug_idx))?;
        }
        Ok(())
    }

    /// All test cases of a bug in `tc_idx` order.
    pub fn test_cases(&self, bug_idx: i64) -> Result<Vec<TestCaseRecord>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "SELECT {TC_COLUMNS} FROM tc_info WHERE bug_idx = ?1 ORDER BY tc_idx"
            ))
            .context("prepare tc query")?;
        let rows = stmt
            .query_map(params![bug_idx], tc_from_row)
            .context("query test cases")?;
        let tcs: Result<Vec<_>, _> = rows.collect();
        tcs.with_context(|| format!("read tc rows for bug {bug_idx}"))
    }

    /// Store both coverage vectors of one test. Widths are persisted
    /// explicitly; the string length is validated here once so readers
    /// can trust the length column.
    pub fn set_tc_vectors(
        &self,
        bug_idx: i64,
        tc_idx: u32,
        full: (&str, u32),
        reduced: (&str, u32),
    ) -> Result<()> {
        if full.0.len() != full.1 as usize || reduced.0.len() != reduced.1 as usize {
            bail!(
                "bit sequence length mismatch for bug {} tc {}: full {}/{}, reduced {}/{}",
                bug_idx,
                tc_idx,
                full.0.len(),
                full.1,
                reduced.0.len(),
                reduced.1
            );
        }
        self.conn()
            .execute(
                "UPDATE tc_info SET full_bit_seq = ?1, full_bit_len = ?2, \
                 reduced_bit_seq = ?3, reduced_bit_len = ?4 \
                 WHERE bug_idx = ?5 AND tc_idx = ?6",
                params![full.0, full.1, reduced.0, reduced.1, bug_idx, tc_idx],
            )
            .with_context(|| format!("set vectors for bug {bug_idx} tc {tc_idx}"))?;
        Ok(())
    }

    /// Flag relevance. Irrelevant tests are flagged, not deleted.
    pub fn set_tc_relevant(&self, bug_idx: i64, tc_idx: u32, relevant: bool) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE tc_info SET relevant_tcs = ?1 WHERE bug_idx = ?2 AND tc_idx = ?3",
                params![relevant, bug_idx, tc_idx],
            )
            .with_context(|| format!("set relevance for bug {bug_idx} tc {tc_idx}"))?;
        Ok(())
    }

    /// Attach the raw backtrace text of a failing test.
    pub fn set_tc_stacktrace(&self, bug_idx: i64, tc_idx: u32, stacktrace: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE tc_info SET stacktrace = ?1 WHERE bug_idx = ?2 AND tc_idx = ?3",
                params![stacktrace, bug_idx, tc_idx],
            )
            .with_context(|| format!("set stacktrace for bug {bug_idx} tc {tc_idx}"))?;
        Ok(())
    }

    /// Relabel an outcome (pass -> cctc during postprocessing).
    pub fn set_tc_outcome(&self, bug_idx: i64, tc_idx: u32, outcome: TestOutcome) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE tc_info SET tc_result = ?1 WHERE bug_idx = ?2 AND tc_idx = ?3",
                params![outcome.as_str(), bug_idx, tc_idx],
            )
            .with_context(|| format!("set outcome for bug {bug_idx} tc {tc_idx}"))?;
        Ok(())
    }
}
