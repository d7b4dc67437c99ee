//! Table definitions.

use anyhow::{Context, Result};
use rusqlite::Connection;

const BUG_INFO: &str = "\
CREATE TABLE IF NOT EXISTS bug_info (
    bug_idx           INTEGER PRIMARY KEY AUTOINCREMENT,
    subject           TEXT NOT NULL,
    experiment_label  TEXT NOT NULL,
    version           TEXT NOT NULL,
    target_code_file  TEXT NOT NULL,

    initial           BOOLEAN DEFAULT NULL,
    usable            BOOLEAN DEFAULT NULL,
    prerequisites     BOOLEAN DEFAULT NULL,
    selected_for_mbfl BOOLEAN DEFAULT NULL,
    mutants_generated BOOLEAN DEFAULT NULL,
    mbfl              BOOLEAN DEFAULT NULL,

    mutant_type       TEXT DEFAULT NULL,

    mut_op            TEXT NOT NULL DEFAULT '',
    pre_start_line    INTEGER NOT NULL DEFAULT 0,
    pre_start_col     INTEGER NOT NULL DEFAULT 0,
    pre_end_line      INTEGER NOT NULL DEFAULT 0,
    pre_end_col       INTEGER NOT NULL DEFAULT 0,
    pre_text          TEXT NOT NULL DEFAULT '',
    post_start_line   INTEGER NOT NULL DEFAULT 0,
    post_start_col    INTEGER NOT NULL DEFAULT 0,
    post_end_line     INTEGER NOT NULL DEFAULT 0,
    post_end_col      INTEGER NOT NULL DEFAULT 0,
    post_text         TEXT NOT NULL DEFAULT '',

    buggy_file        TEXT DEFAULT NULL,
    buggy_function    TEXT DEFAULT NULL,
    buggy_lineno      INTEGER DEFAULT NULL,

    num_failing_tcs     INTEGER DEFAULT NULL,
    num_passing_tcs     INTEGER DEFAULT NULL,
    num_ctcs            INTEGER DEFAULT NULL,
    num_total_lines     INTEGER DEFAULT NULL,
    num_candidate_lines INTEGER DEFAULT NULL,

    UNIQUE (subject, experiment_label, version)
)";

const TC_INFO: &str = "\
CREATE TABLE IF NOT EXISTS tc_info (
    bug_idx         INTEGER NOT NULL,
    tc_idx          INTEGER NOT NULL,
    tc_name         TEXT NOT NULL,
    tc_result       TEXT NOT NULL,
    relevant_tcs    BOOLEAN DEFAULT NULL,
    full_bit_seq    TEXT DEFAULT NULL,
    full_bit_len    INTEGER DEFAULT NULL,
    reduced_bit_seq TEXT DEFAULT NULL,
    reduced_bit_len INTEGER DEFAULT NULL,
    stacktrace      TEXT DEFAULT NULL,
    PRIMARY KEY (bug_idx, tc_idx),
    FOREIGN KEY (bug_idx) REFERENCES bug_info(bug_idx)
        ON DELETE CASCADE ON UPDATE CASCADE
)";

const LINE_INFO: &str = "\
CREATE TABLE IF NOT EXISTS line_info (
    bug_idx             INTEGER NOT NULL,
    line_idx            INTEGER NOT NULL,
    file                TEXT NOT NULL,
    function            TEXT NOT NULL,
    lineno              INTEGER NOT NULL,
    is_buggy_line       BOOLEAN NOT NULL,
    st_relevance        REAL DEFAULT NULL,
    st_relevance_linear REAL DEFAULT NULL,
    st_distance         INTEGER DEFAULT NULL,
    PRIMARY KEY (bug_idx, line_idx),
    FOREIGN KEY (bug_idx) REFERENCES bug_info(bug_idx)
        ON DELETE CASCADE ON UPDATE CASCADE
)";

const MUTATION_INFO: &str = "\
CREATE TABLE IF NOT EXISTS mutation_info (
    bug_idx           INTEGER NOT NULL,
    mutant_idx        INTEGER NOT NULL,
    targetting_file   TEXT NOT NULL,
    mutation_dirname  TEXT NOT NULL,
    mutant_filename   TEXT NOT NULL,
    line_idx          INTEGER DEFAULT NULL,
    mut_op            TEXT NOT NULL DEFAULT '',
    build_result      BOOLEAN DEFAULT NULL,
    result_transition TEXT DEFAULT NULL,
    PRIMARY KEY (bug_idx, mutant_idx),
    FOREIGN KEY (bug_idx) REFERENCES bug_info(bug_idx)
        ON DELETE CASCADE ON UPDATE CASCADE
)";

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_bug_info_experiment
         ON bug_info (subject, experiment_label)",
    "CREATE INDEX IF NOT EXISTS idx_tc_info_bug_idx ON tc_info (bug_idx)",
    "CREATE INDEX IF NOT EXISTS idx_line_info_bug_idx ON line_info (bug_idx)",
    "CREATE INDEX IF NOT EXISTS idx_mutation_info_bug_idx ON mutation_info (bug_idx)",
];

pub fn create_all(conn: &Connection) -> Result<()> {
    for stmt in [BUG_INFO, TC_INFO, LINE_INFO, MUTATION_INFO] {
        conn.execute(stmt, []).context("create table")?;
    }
    for stmt in INDEXES {
        conn.execute(stmt, []).context("create index")?;
    }
    Ok(())
}
