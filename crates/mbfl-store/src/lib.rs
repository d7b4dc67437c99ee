//! SQLite-backed datastore for pipeline records.
//!
//! Four tables mirror the domain records: `bug_info`, `tc_info`,
//! `line_info`, `mutation_info`. Every write is a single bounded
//! insert or keyed update — never a read-modify-write transaction.
//! Correctness across concurrent slots relies on the stage predicates
//! and the single-writer-per-bug dispatch invariant, not on datastore
//! locking: each worker subprocess owns one connection and only ever
//! writes rows of the bug it was dispatched.
//!
//! Bit sequences are stored as '0'/'1' text next to an explicit
//! integer length column; readers must check the declared length, not
//! infer it from the string.

mod bug;
mod line;
mod mutation;
mod schema;
mod tc;

pub use bug::CoverageSummary;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Handle to the experiment datastore.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the datastore at `path` and ensure
    /// the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create datastore dir {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open datastore {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory datastore")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        // Slots on other machines may hold the file open over NFS;
        // WAL keeps the engine's reads from blocking worker writes.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        schema::create_all(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
