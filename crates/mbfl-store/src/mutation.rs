//! `mutation_info` reads and writes.

use anyhow::{Context, Result};
use rusqlite::{params, Row};

use mbfl_types::MutationRecord;

use crate::Store;

const MUTATION_COLUMNS: &str = "\
bug_idx, mutant_idx, targetting_file, mutation_dirname, mutant_filename, \
line_idx, mut_op, build_result, result_transition";

fn mutation_from_row(row: &Row<'_>) -> rusqlite::Result<MutationRecord> {
    Ok(MutationRecord {
        bug_idx: row.get(0)?,
        mutant_idx: row.get(1)?,
        targetting_file: row.get(2)?,
        mutation_dirname: row.get(3)?,
        mutant_filename: row.get(4)?,
        line_idx: row.get(5)?,
        mut_op: row.get(6)?,
        build_result: row.get(7)?,
        result_transition: row.get(8)?,
    })
}

impl Store {
    /// Batch-insert the second-order mutants generated for one bug.
    pub fn insert_mutations(&self, mutations: &[MutationRecord]) -> Result<()> {
        let mut stmt = self
            .conn()
            .prepare(
                "INSERT INTO mutation_info (bug_idx, mutant_idx, targetting_file, \
                 mutation_dirname, mutant_filename, line_idx, mut_op) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .context("prepare mutation insert")?;
        for m in mutations {
            stmt.execute(params![
                m.bug_idx,
                m.mutant_idx,
                m.targetting_file,
                m.mutation_dirname,
                m.mutant_filename,
                m.line_idx,
                m.mut_op,
            ])
            .with_context(|| format!("insert mutation {} for bug {}", m.mutant_idx, m.bug_idx))?;
        }
        Ok(())
    }

    /// All second-order mutants of a bug in `mutant_idx` order.
    pub fn mutations_for_bug(&self, bug_idx: i64) -> Result<Vec<MutationRecord>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "SELECT {MUTATION_COLUMNS} FROM mutation_info \
                 WHERE bug_idx = ?1 ORDER BY mutant_idx"
            ))
            .context("prepare mutation query")?;
        let rows = stmt
            .query_map(params![bug_idx], mutation_from_row)
            .context("query mutations")?;
        let mutations: Result<Vec<_>, _> = rows.collect();
        mutations.with_context(|| format!("read mutation rows for bug {bug_idx}"))
    }

    /// Record mutation-testing results for one second-order mutant:
    /// whether it built, and the outcome transition its suite showed
    /// (e.g. "f2p"). A failed build leaves the transition NULL.
    pub fn set_mutation_result(
        &self,
        bug_idx: i64,
        mutant_idx: u32,
        build_result: bool,
        result_transition: Option<&str>,
    ) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE mutation_info SET build_result = ?1, result_transition = ?2 \
                 WHERE bug_idx = ?3 AND mutant_idx = ?4",
                params![build_result, result_transition, bug_idx, mutant_idx],
            )
            .with_context(|| format!("set result for bug {bug_idx} mutant {mutant_idx}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mbfl_types::{
        BugRecord, Gate, LineKey, LineRecord, MutationRecord, Stage, TestCaseRecord, TestOutcome,
    };

    use crate::{CoverageSummary, Store};

    fn seeded_bug(version: &str) -> BugRecord {
        BugRecord {
            subject: "zlib_ng".into(),
            experiment_label: "exp1".into(),
            version: version.into(),
            target_code_file: "src/deflate.c".into(),
            initial: Some(true),
            ..BugRecord::default()
        }
    }

    #[test]
    fn bug_round_trips_through_store() {
        let store = Store::open_in_memory().unwrap();
        let idx = store.insert_bug(&seeded_bug("deflate.MUT1.c")).unwrap();
        let bug = store.bug(idx).unwrap();
        assert_eq!(bug.bug_idx, idx);
        assert_eq!(bug.version, "deflate.MUT1.c");
        assert_eq!(bug.initial, Some(true));
        assert_eq!(bug.usable, None);

        let by_version = store
            .bug_by_version("zlib_ng", "exp1", "deflate.MUT1.c")
            .unwrap();
        assert_eq!(by_version.bug_idx, idx);
    }

    #[test]
    fn stage_predicate_requires_prior_gates_and_unset_own_gate() {
        let store = Store::open_in_memory().unwrap();
        let a = store.insert_bug(&seeded_bug("deflate.MUT1.c")).unwrap();
        let b = store.insert_bug(&seeded_bug("deflate.MUT2.c")).unwrap();
        let c = store.insert_bug(&seeded_bug("deflate.MUT3.c")).unwrap();

        // a passed usability, b was rejected there, c already finished
        // prerequisite extraction.
        store.set_gate(a, Gate::Usable, true).unwrap();
        store.set_mutant_type(b, "build_failed").unwrap();
        store.set_gate(c, Gate::Usable, true).unwrap();
        store.set_gate(c, Gate::Prerequisites, true).unwrap();

        let eligible = store
            .bugs_for_stage(Stage::PrerequisiteExtraction, "zlib_ng", "exp1")
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].bug_idx, a);

        // The rejected bug stays invisible to every later stage.
        let later = store
            .bugs_for_stage(Stage::MbflSelection, "zlib_ng", "exp1")
            .unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].bug_idx, c);
    }

    #[test]
    fn tc_vectors_validate_declared_widths() {
        let store = Store::open_in_memory().unwrap();
        let idx = store.insert_bug(&seeded_bug("deflate.MUT1.c")).unwrap();
        store
            .insert_test_cases(&[TestCaseRecord::new(idx, 0, "TC1", TestOutcome::Fail)])
            .unwrap();

        store
            .set_tc_vectors(idx, 0, ("10110", 5), ("11", 2))
            .unwrap();
        assert!(store.set_tc_vectors(idx, 0, ("10110", 4), ("11", 2)).is_err());

        let tcs = store.test_cases(idx).unwrap();
        assert_eq!(tcs[0].full_bit_seq.as_deref(), Some("10110"));
        assert_eq!(tcs[0].full_bit_len, Some(5));
        assert_eq!(tcs[0].reduced_bit_len, Some(2));
    }

    #[test]
    fn outcome_relabel_and_relevance_flags_persist() {
        let store = Store::open_in_memory().unwrap();
        let idx = store.insert_bug(&seeded_bug("deflate.MUT1.c")).unwrap();
        store
            .insert_test_cases(&[
                TestCaseRecord::new(idx, 0, "TC1", TestOutcome::Fail),
                TestCaseRecord::new(idx, 1, "TC2", TestOutcome::Pass),
            ])
            .unwrap();

        store.set_tc_relevant(idx, 0, true).unwrap();
        store.set_tc_outcome(idx, 1, TestOutcome::Cctc).unwrap();

        let tcs = store.test_cases(idx).unwrap();
        assert_eq!(tcs[0].relevant, Some(true));
        assert_eq!(tcs[1].outcome, TestOutcome::Cctc);
    }

    #[test]
    fn lines_and_mutations_cascade_with_their_bug() {
        let store = Store::open_in_memory().unwrap();
        let idx = store.insert_bug(&seeded_bug("deflate.MUT1.c")).unwrap();

        store
            .insert_lines(&[LineRecord {
                bug_idx: idx,
                line_idx: 0,
                key: LineKey::new("src/deflate.c", "deflate_stored", 1423),
                is_buggy_line: true,
                st_relevance: Some(1.0),
                st_relevance_linear: Some(1.0),
                st_distance: Some(0),
            }])
            .unwrap();
        store
            .insert_mutations(&[MutationRecord {
                bug_idx: idx,
                mutant_idx: 0,
                targetting_file: "src/deflate.c".into(),
                mutation_dirname: "deflate".into(),
                mutant_filename: "deflate.MUT1-7.c".into(),
                line_idx: Some(0),
                mut_op: "AOR".into(),
                build_result: None,
                result_transition: None,
            }])
            .unwrap();
        store.set_mutation_result(idx, 0, true, Some("f2p")).unwrap();

        let lines = store.lines(idx).unwrap();
        assert_eq!(lines[0].key.lineno, 1423);
        let muts = store.mutations_for_bug(idx).unwrap();
        assert_eq!(muts[0].result_transition.as_deref(), Some("f2p"));

        store.purge_experiment("zlib_ng", "exp1").unwrap();
        assert!(store.lines(idx).unwrap().is_empty());
        assert!(store.mutations_for_bug(idx).unwrap().is_empty());
    }

    #[test]
    fn coverage_summary_and_buggy_line_update_in_place() {
        let store = Store::open_in_memory().unwrap();
        let idx = store.insert_bug(&seeded_bug("deflate.MUT1.c")).unwrap();

        store
            .set_buggy_line(idx, &LineKey::new("src/deflate.c", "deflate_stored", 1423))
            .unwrap();
        store
            .set_coverage_summary(
                idx,
                &CoverageSummary {
                    num_failing_tcs: 2,
                    num_passing_tcs: 40,
                    num_ctcs: 1,
                    num_total_lines: 900,
                    num_candidate_lines: 73,
                },
            )
            .unwrap();

        let bug = store.bug(idx).unwrap();
        assert_eq!(
            bug.buggy_line_key(),
            Some(LineKey::new("src/deflate.c", "deflate_stored", 1423))
        );
        assert_eq!(bug.num_candidate_lines, Some(73));
    }
}
