//! External coverage-tool contracts.
//!
//! Two inputs feed the reduction engine:
//! - the coverage extractor's JSON report,
//!   `{files: [{file, lines: [{line_number, count}, ...]}]}`
//! - the function-boundary extractor's line-oriented output,
//!   `class##function##start_line##end_line##origin_file:line:col##filename`
//!
//! Coverage reports carry execution counts per line but no function
//! names; the boundary table supplies the function component of each
//! canonical line key.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Execution count for one source line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineExecution {
    pub line_number: u32,
    pub count: u64,
}

/// Per-file line executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCoverage {
    pub file: String,
    pub lines: Vec<LineExecution>,
}

/// One test's raw coverage report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub files: Vec<FileCoverage>,
}

impl CoverageReport {
    /// Parse a report file written by the coverage extractor.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read coverage report {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse coverage report {}", path.display()))
    }
}

#[derive(Debug, Clone)]
struct FunctionSpan {
    file: String,
    function: String,
    start_line: u32,
    end_line: u32,
}

/// Lookup from (file, line) to the enclosing function, built from the
/// function-boundary extractor's output.
#[derive(Debug, Clone, Default)]
pub struct FunctionBoundaries {
    spans: Vec<FunctionSpan>,
}

impl FunctionBoundaries {
    /// Parse extractor output. Lines that do not have the expected
    /// `##`-separated shape are rejected: a malformed boundary table
    /// would silently mis-key every coverage line downstream.
    pub fn parse(text: &str) -> Result<Self> {
        let mut spans = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split("##").collect();
            if fields.len() != 6 {
                bail!(
                    "function boundary line {} has {} fields, expected 6: {:?}",
                    lineno + 1,
                    fields.len(),
                    line
                );
            }
            let start_line: u32 = fields[2]
                .parse()
                .with_context(|| format!("boundary start_line on line {}", lineno + 1))?;
            let end_line: u32 = fields[3]
                .parse()
                .with_context(|| format!("boundary end_line on line {}", lineno + 1))?;
            spans.push(FunctionSpan {
                file: fields[5].to_string(),
                function: fields[1].to_string(),
                start_line,
                end_line,
            });
        }
        Ok(Self { spans })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read function boundaries {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse function boundaries {}", path.display()))
    }

    /// The function enclosing `line` of `file`, if any. Files are
    /// matched by path suffix because the extractor reports paths from
    /// the preprocessed translation unit.
    pub fn function_for(&self, file: &str, line: u32) -> Option<&str> {
        self.spans
            .iter()
            .find(|s| {
                line >= s.start_line
                    && line <= s.end_line
                    && (s.file.ends_with(file) || file.ends_with(&s.file))
            })
            .map(|s| s.function.as_str())
    }
}
