//! Dense line indexing.
//!
//! The full index space of a bug is built from the union of every
//! test's coverage report: each distinct canonical (file, function,
//! line) key gets one dense index, assigned in sorted key order. The
//! space is sized to everything ever observed for the bug, so every
//! test's vector shares one width.

use std::collections::BTreeSet;
use std::collections::HashMap;

use mbfl_types::{canonical_source_path, LineKey};

use crate::bitvec::CovBitVec;
use crate::report::{CoverageReport, FunctionBoundaries};

/// Accumulates canonical line keys across test reports, then freezes
/// into a [`FullIndexSpace`].
#[derive(Debug)]
pub struct LineIndexer<'a> {
    subject: String,
    boundaries: &'a FunctionBoundaries,
    keys: BTreeSet<LineKey>,
}

impl<'a> LineIndexer<'a> {
    pub fn new(subject: impl Into<String>, boundaries: &'a FunctionBoundaries) -> Self {
        Self {
            subject: subject.into(),
            boundaries: boundaries,
            keys: BTreeSet::new(),
        }
    }

    /// Canonicalize one observed (file, line) into its key. Lines that
    /// fall outside every known function boundary are keyed with an
    /// empty function name rather than dropped; they are still
    /// executable lines.
    pub fn key_for(&self, file: &str, line: u32) -> LineKey {
        let file = canonical_source_path(file, &self.subject);
        let function = self
            .boundaries
            .function_for(&file, line)
            .unwrap_or_default()
            .to_string();
        LineKey::new(file, function, line)
    }

    /// Record every line of one test's report, regardless of count.
    /// The full space covers all observed lines; execution counts only
    /// matter when building per-test vectors.
    pub fn add_report(&mut self, report: &CoverageReport) {
        for file_cov in &report.files {
            for line in &file_cov.lines {
                self.keys.insert(self.key_for(&file_cov.file, line.line_number));
            }
        }
    }

    /// Freeze into the dense, sorted full index space.
    pub fn build(self) -> FullIndexSpace {
        let keys: Vec<LineKey> = self.keys.into_iter().collect();
        let index = keys
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, k)| (k, i))
            .collect();
        FullIndexSpace {
            subject: self.subject,
            keys,
            index,
        }
    }
}

/// The frozen full index space of one bug.
#[derive(Debug, Clone)]
pub struct FullIndexSpace {
    subject: String,
    keys: Vec<LineKey>,
    index: HashMap<LineKey, usize>,
}

impl FullIndexSpace {
    /// Number of distinct line keys (the shared vector width).
    pub fn width(&self) -> usize {
        self.keys.len()
    }

    /// Key at a given dense index.
    pub fn key(&self, idx: usize) -> &LineKey {
        &self.keys[idx]
    }

    /// All keys in index order.
    pub fn keys(&self) -> &[LineKey] {
        &self.keys
    }

    /// Index of a canonical key.
    pub fn index_of(&self, key: &LineKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Build one test's full-space vector: bit i set iff the report
    /// shows execution count > 0 at index i.
    pub fn vector_for(&self, report: &CoverageReport, boundaries: &FunctionBoundaries) -> CovBitVec {
        let mut v = CovBitVec::zeroed(self.width());
        for file_cov in &report.files {
            for line in &file_cov.lines {
                if line.count == 0 {
                    continue;
                }
                let file = canonical_source_path(&file_cov.file, &self.subject);
                let function = boundaries
                    .function_for(&file, line.line_number)
                    .unwrap_or_default()
                    .to_string();
                let key = LineKey::new(file, function, line.line_number);
                if let Some(idx) = self.index_of(&key) {
                    v.set(idx);
                }
            }
        }
        v
    }
}
