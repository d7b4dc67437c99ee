//! Mutant-generator CSV ledger parsing.
//!
//! The generator writes one ledger per target file: two header rows
//! followed by data rows
//! `[name, operator, pre_start_line, pre_start_col, pre_end_line,
//! pre_end_col, pre_text, post_start_line, post_start_col,
//! post_end_line, post_end_col, post_text]`.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::debug;

use mbfl_types::MutationSite;

/// One ledger row: the mutant file name plus its mutation site.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub mutant_name: String,
    pub site: MutationSite,
}

const HEADER_ROWS: usize = 2;
const FIELDS: usize = 12;

pub fn read_mutation_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open mutation ledger {}", path.display()))?;

    let mut entries = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read ledger row {}", idx + 1))?;
        if idx < HEADER_ROWS {
            continue;
        }
        if record.len() < FIELDS {
            bail!(
                "{}:{}: expected {FIELDS} fields, got {}",
                path.display(),
                idx + 1,
                record.len()
            );
        }
        let parse_u32 = |field: usize| -> Result<u32> {
            record[field].trim().parse().with_context(|| {
                format!(
                    "{}:{}: field {field} is not a line/column number",
                    path.display(),
                    idx + 1
                )
            })
        };
        entries.push(LedgerEntry {
            mutant_name: record[0].trim().to_string(),
            site: MutationSite {
                operator: record[1].trim().to_string(),
                pre_start_line: parse_u32(2)?,
                pre_start_col: parse_u32(3)?,
                pre_end_line: parse_u32(4)?,
                pre_end_col: parse_u32(5)?,
                pre_text: record[6].to_string(),
                post_start_line: parse_u32(7)?,
                post_start_col: parse_u32(8)?,
                post_end_line: parse_u32(9)?,
                post_end_col: parse_u32(10)?,
                post_text: record[11].to_string(),
            },
        });
    }
    debug!(ledger = %path.display(), mutants = entries.len(), "ledger parsed");
    Ok(entries)
}
