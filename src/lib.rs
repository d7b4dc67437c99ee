//! MBFL experiment pipeline control plane.
//!
//! Drives mutation-based fault-localization experiments over C/C++
//! subjects: mutant generation, staged acceptance filtering,
//! distributed test and coverage execution across (machine, core)
//! slots, and reduction of raw per-test line coverage into the bit
//! vectors suspiciousness formulas consume.
//!
//! - **Engines** ([`engine`]) select eligible mutants per stage and
//!   dispatch batches.
//! - **Executors** ([`executor`]) fan tasks out to slots, locally or
//!   over ssh/rsync.
//! - **Workers** ([`worker`]) do the per-mutant work inside one slot
//!   and flip the stage gates.
//! - **Postprocessing** ([`postprocess`]) reduces coverage into each
//!   bug's candidate space.

pub mod args;
pub mod config;
pub mod engine;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod mutant;
pub mod postprocess;
pub mod process;
pub mod queue;
pub mod subject;
pub mod worker;
