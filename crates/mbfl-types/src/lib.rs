//! Shared types for the mbfl-pipeline workspace.
//!
//! This crate provides the foundational domain types used across the
//! pipeline crates, breaking circular dependency chains:
//! - [`record`] - persistent bug / test-case / line / mutation records
//! - [`stage`] - the pipeline stage state machine and gate predicates
//! - [`slot`] - (machine, core) execution slot identity

pub mod path;
pub mod record;
pub mod slot;
pub mod stage;

pub use path::canonical_source_path;
pub use record::{
    BugRecord, LineKey, LineRecord, MutationRecord, MutationSite, TestCaseRecord, TestOutcome,
};
pub use slot::SlotId;
pub use stage::{Gate, Stage};

use std::time::Duration;

/// Configuration for retry behavior on artifact-copy operations.
#[derive(Debug, Copy, Clone)]
pub struct RetryConfig {
    /// Number of retry attempts after the initial try.
    pub retries: usize,
    /// Backoff duration between attempts.
    pub backoff: Duration,
}

impl RetryConfig {
    /// Create a new RetryConfig with the specified parameters.
    pub fn new(retries: usize, backoff_ms: u64) -> Self {
        Self {
            retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        // Artifact copies get one retry, then the task is abandoned.
        Self {
            retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}
