//! `line_info` reads and writes.

use anyhow::{Context, Result};
use rusqlite::{params, Row};

use mbfl_types::{LineKey, LineRecord};

use crate::Store;

fn line_from_row(row: &Row<'_>) -> rusqlite::Result<LineRecord> {
    Ok(LineRecord {
        bug_idx: row.get(0)?,
        line_idx: row.get(1)?,
        key: LineKey {
            file: row.get(2)?,
            function: row.get(3)?,
            lineno: row.get(4)?,
        },
        is_buggy_line: row.get(5)?,
        st_relevance: row.get(6)?,
        st_relevance_linear: row.get(7)?,
        st_distance: row.get(8)?,
    })
}

impl Store {
    /// Batch-insert the candidate-line rows of one bug. Created exactly
    /// once at coverage-postprocessing time, complete with their
    /// stack-trace relevance features, and immutable thereafter.
    pub fn insert_lines(&self, lines: &[LineRecord]) -> Result<()> {
        let mut stmt = self
            .conn()
            .prepare(
                "INSERT INTO line_info (bug_idx, line_idx, file, function, lineno, \
                 is_buggy_line, st_relevance, st_relevance_linear, st_distance) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .context("prepare line insert")?;
        for line in lines {
            stmt.execute(params![
                line.bug_idx,
                line.line_idx,
                line.key.file,
                line.key.function,
                line.key.lineno,
                line.is_buggy_line,
                line.st_relevance,
                line.st_relevance_linear,
                line.st_distance,
            ])
            .with_context(|| format!("insert line {} for bug {}", line.line_idx, line.bug_idx))?;
        }
        Ok(())
    }

    /// All candidate lines of a bug in `line_idx` order.
    pub fn lines(&self, bug_idx: i64) -> Result<Vec<LineRecord>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT bug_idx, line_idx, file, function, lineno, is_buggy_line, \
                 st_relevance, st_relevance_linear, st_distance \
                 FROM line_info WHERE bug_idx = ?1 ORDER BY line_idx",
            )
            .context("prepare line query")?;
        let rows = stmt
            .query_map(params![bug_idx], line_from_row)
            .context("query lines")?;
        let lines: Result<Vec<_>, _> = rows.collect();
        lines.with_context(|| format!("read line rows for bug {bug_idx}"))
    }
}
