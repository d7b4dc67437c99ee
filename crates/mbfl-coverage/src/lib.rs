//! Coverage representation and reduction for the MBFL pipeline.
//!
//! This crate turns raw per-test line-execution reports into compact
//! fixed-width bit vectors:
//! - [`bitvec`] - pure operations over fixed-width binary vectors
//! - [`report`] - the coverage-extractor JSON contract and the
//!   function-boundary lookup
//! - [`indexer`] - dense (file, function, line) -> index mapping
//! - [`reduce`] - failing-footprint merge, candidate-space
//!   reprojection, relevance filtering

pub mod bitvec;
pub mod indexer;
pub mod reduce;
pub mod report;

pub use bitvec::CovBitVec;
pub use indexer::{FullIndexSpace, LineIndexer};
pub use mbfl_types::canonical_source_path;
pub use reduce::{identify_not_relevant, merge, unreduce, CandidateSpace};
pub use report::{CoverageReport, FileCoverage, FunctionBoundaries, LineExecution};
