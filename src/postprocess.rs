//! Coverage postprocessing for one bug.
//!
//! Takes the per-test coverage reports and failing backtraces the
//! prerequisite worker collected and derives everything downstream:
//! the full index space, the failing footprint, the candidate space
//! and its line rows, reprojected per-test vectors, relevance flags,
//! cctc relabeling, and the summary counters. Runs exactly once per
//! bug; all of its writes are idempotent updates keyed by the bug.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

use mbfl_coverage::{
    merge, CandidateSpace, CovBitVec, CoverageReport, FunctionBoundaries, LineIndexer,
};
use mbfl_stacktrace::TraceIndex;
use mbfl_store::{CoverageSummary, Store};
use mbfl_types::{canonical_source_path, BugRecord, LineKey, LineRecord, TestOutcome};

use crate::config::ExperimentConfig;

pub fn process_bug(
    store: &Store,
    config: &ExperimentConfig,
    subject: &str,
    bug: &BugRecord,
    st_scale: f64,
) -> Result<()> {
    let boundaries = FunctionBoundaries::load(&config.boundaries_file())?;
    let tcs = store.test_cases(bug.bug_idx)?;
    if tcs.is_empty() {
        bail!("bug {} has no test-case rows", bug.version);
    }

    // Load every test's report and build the shared full index space.
    let cov_dir = config.coverage_dir().join(&bug.version);
    let mut reports = BTreeMap::new();
    for tc in &tcs {
        let path = cov_dir.join(format!("{}.json", tc.tc_name));
        reports.insert(tc.tc_idx, CoverageReport::load(&path)?);
    }
    let mut indexer = LineIndexer::new(subject, &boundaries);
    for report in reports.values() {
        indexer.add_report(report);
    }
    let full = indexer.build();
    if full.width() == 0 {
        bail!("bug {} produced no coverage at all", bug.version);
    }

    let vectors: BTreeMap<u32, CovBitVec> = reports
        .iter()
        .map(|(&tc_idx, report)| (tc_idx, full.vector_for(report, &boundaries)))
        .collect();

    // Failing footprint F and the candidate space it defines.
    let failing: Vec<u32> = tcs
        .iter()
        .filter(|t| t.outcome == TestOutcome::Fail)
        .map(|t| t.tc_idx)
        .collect();
    if failing.is_empty() {
        bail!("bug {} has no failing tests to reduce against", bug.version);
    }
    let footprint = merge(failing.iter().map(|i| &vectors[i]), full.width());
    let space = CandidateSpace::from_footprint(&footprint, &full);
    debug!(
        version = %bug.version,
        full_width = full.width(),
        candidates = space.width(),
        "candidate space derived"
    );

    // Resolve the buggy line and hold it to the containment invariant:
    // with a failing test present it must sit inside the footprint.
    let buggy_key = buggy_line_key(bug, subject, &boundaries);
    store.set_buggy_line(bug.bug_idx, &buggy_key)?;
    let Some(buggy_reduced_idx) = space.reduced_index_of(&buggy_key) else {
        bail!(
            "buggy line {buggy_key} of bug {} is outside the candidate space",
            bug.version
        );
    };

    // Candidate line rows, scored against the failing backtraces.
    let traces = TraceIndex::build(
        tcs.iter()
            .filter(|t| t.outcome == TestOutcome::Fail)
            .filter_map(|t| t.stacktrace.as_deref()),
        subject,
    );
    let lines: Vec<LineRecord> = space
        .keys()
        .iter()
        .enumerate()
        .map(|(idx, key)| {
            let rel = traces.score_line(key, subject, st_scale);
            LineRecord {
                bug_idx: bug.bug_idx,
                line_idx: idx as u32,
                key: key.clone(),
                is_buggy_line: idx == buggy_reduced_idx,
                st_relevance: Some(rel.score),
                st_relevance_linear: Some(rel.linear),
                st_distance: rel.distance,
            }
        })
        .collect();
    store.insert_lines(&lines)?;

    // Persist both vectors of every test with their declared widths.
    for tc in &tcs {
        let v = &vectors[&tc.tc_idx];
        let reduced = space.reproject(v);
        store.set_tc_vectors(
            bug.bug_idx,
            tc.tc_idx,
            (&v.to_bit_string(), full.width() as u32),
            (&reduced.to_bit_string(), space.width() as u32),
        )?;
    }

    // Relevance flags and cctc relabeling. A passing test that covers
    // the buggy line is a candidate correct test case: kept, flagged
    // irrelevant, excluded from scoring.
    let buggy_full_idx = full
        .index_of(&buggy_key)
        .context("buggy key vanished from the full space")?;
    let mut num_passing = 0u32;
    let mut num_ctcs = 0u32;
    for tc in &tcs {
        let v = &vectors[&tc.tc_idx];
        match tc.outcome {
            TestOutcome::Fail => store.set_tc_relevant(bug.bug_idx, tc.tc_idx, true)?,
            TestOutcome::Crashed | TestOutcome::Cctc => {
                store.set_tc_relevant(bug.bug_idx, tc.tc_idx, false)?;
            }
            TestOutcome::Pass => {
                if v.get(buggy_full_idx) {
                    store.set_tc_outcome(bug.bug_idx, tc.tc_idx, TestOutcome::Cctc)?;
                    store.set_tc_relevant(bug.bug_idx, tc.tc_idx, false)?;
                    num_ctcs += 1;
                } else {
                    store.set_tc_relevant(bug.bug_idx, tc.tc_idx, v.intersects(&footprint))?;
                    num_passing += 1;
                }
            }
        }
    }

    let summary = CoverageSummary {
        num_failing_tcs: failing.len() as u32,
        num_passing_tcs: num_passing,
        num_ctcs,
        num_total_lines: full.width() as u32,
        num_candidate_lines: space.width() as u32,
    };
    store.set_coverage_summary(bug.bug_idx, &summary)?;
    info!(
        version = %bug.version,
        failing = summary.num_failing_tcs,
        passing = summary.num_passing_tcs,
        ctcs = summary.num_ctcs,
        candidates = summary.num_candidate_lines,
        "bug postprocessed"
    );
    Ok(())
}

/// The mutated line's canonical identity: subject-relative file, the
/// enclosing function from the boundary table, and the pre-mutation
/// start line.
fn buggy_line_key(bug: &BugRecord, subject: &str, boundaries: &FunctionBoundaries) -> LineKey {
    let file = canonical_source_path(&bug.target_code_file, subject);
    let function = boundaries
        .function_for(&file, bug.mutation.pre_start_line)
        .unwrap_or_default()
        .to_string();
    LineKey::new(file, function, bug.mutation.pre_start_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbfl_types::{MutationSite, TestCaseRecord};
    use tempfile::TempDir;

    // End-to-end reduction over a fabricated bug: one failing test
    // covering {10, 20, 30}, one passing test covering {20, 40}, one
    // passing test covering {40} only. Mutation sits on line 20.
    fn write_report(dir: &std::path::Path, name: &str, covered: &[(u32, u64)]) {
        let lines: Vec<String> = covered
            .iter()
            .map(|(l, c)| format!(r#"{{"line_number":{l},"count":{c}}}"#))
            .collect();
        let json = format!(
            r#"{{"files":[{{"file":"src/deflate.c","lines":[{}]}}]}}"#,
            lines.join(",")
        );
        std::fs::write(dir.join(name), json).unwrap();
    }

    fn test_config(root: &std::path::Path) -> ExperimentConfig {
        let out_dir = root.join("exp1").join("zlib_ng");
        ExperimentConfig {
            research_data: root.to_path_buf(),
            out_dir: out_dir.clone(),
            working_env_dir: out_dir.join("working_env"),
            subjects_dir: root.join("subjects"),
            log_dir: root.join("logs").join("exp1").join("zlib_ng"),
            db_path: root.join("mbfl.db"),
            slots: vec![mbfl_types::SlotId::new("localhost", 0, root)],
            caps: crate::config::StageCaps::default(),
        }
    }

    fn seeded_environment() -> (TempDir, ExperimentConfig, Store, BugRecord) {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());

        let store = Store::open(&config.db_path).unwrap();
        let mut bug = BugRecord {
            subject: "zlib_ng".into(),
            experiment_label: "exp1".into(),
            version: "deflate.MUT1.c".into(),
            target_code_file: "src/deflate.c".into(),
            initial: Some(true),
            mutation: MutationSite {
                operator: "AOR".into(),
                pre_start_line: 20,
                ..MutationSite::default()
            },
            ..BugRecord::default()
        };
        bug.bug_idx = store.insert_bug(&bug).unwrap();

        store
            .insert_test_cases(&[
                TestCaseRecord::new(bug.bug_idx, 0, "TC1.sh", TestOutcome::Fail),
                TestCaseRecord::new(bug.bug_idx, 1, "TC2.sh", TestOutcome::Pass),
                TestCaseRecord::new(bug.bug_idx, 2, "TC3.sh", TestOutcome::Pass),
            ])
            .unwrap();

        let cov_dir = config.coverage_dir().join(&bug.version);
        std::fs::create_dir_all(&cov_dir).unwrap();
        write_report(&cov_dir, "TC1.sh.json", &[(10, 1), (20, 1), (30, 1), (40, 0)]);
        write_report(&cov_dir, "TC2.sh.json", &[(10, 0), (20, 2), (30, 0), (40, 1)]);
        write_report(&cov_dir, "TC3.sh.json", &[(10, 0), (20, 0), (30, 0), (40, 5)]);

        std::fs::create_dir_all(config.boundaries_file().parent().unwrap()).unwrap();
        std::fs::write(
            config.boundaries_file(),
            "Deflate##deflate_stored##1##100##src/deflate.c:1:1##src/deflate.c\n",
        )
        .unwrap();

        (tmp, config, store, bug)
    }

    #[test]
    fn reduction_derives_candidates_relevance_and_cctc() {
        let (_tmp, config, store, bug) = seeded_environment();

        process_bug(&store, &config, "zlib_ng", &bug, 1.0).unwrap();

        // Candidate space = failing footprint {10, 20, 30}.
        let lines = store.lines(bug.bug_idx).unwrap();
        assert_eq!(lines.len(), 3);
        let buggy: Vec<_> = lines.iter().filter(|l| l.is_buggy_line).collect();
        assert_eq!(buggy.len(), 1);
        assert_eq!(buggy[0].key.lineno, 20);

        let tcs = store.test_cases(bug.bug_idx).unwrap();
        // Failing test: relevant, full width 4, reduced width 3.
        assert_eq!(tcs[0].relevant, Some(true));
        assert_eq!(tcs[0].full_bit_len, Some(4));
        assert_eq!(tcs[0].reduced_bit_len, Some(3));
        // TC2 covers the buggy line while passing: relabeled cctc.
        assert_eq!(tcs[1].outcome, TestOutcome::Cctc);
        assert_eq!(tcs[1].relevant, Some(false));
        // TC3 shares nothing with the footprint: irrelevant.
        assert_eq!(tcs[2].relevant, Some(false));

        let refreshed = store.bug(bug.bug_idx).unwrap();
        assert_eq!(refreshed.num_failing_tcs, Some(1));
        assert_eq!(refreshed.num_passing_tcs, Some(0));
        assert_eq!(refreshed.num_ctcs, Some(1));
        assert_eq!(refreshed.num_candidate_lines, Some(3));
        assert_eq!(refreshed.buggy_lineno, Some(20));
        assert_eq!(refreshed.buggy_function.as_deref(), Some("deflate_stored"));
    }

    #[test]
    fn buggy_line_outside_the_footprint_is_an_error() {
        let (_tmp, config, store, mut bug) = seeded_environment();
        // Move the mutation to a line no failing test covers.
        bug.mutation.pre_start_line = 40;
        assert!(process_bug(&store, &config, "zlib_ng", &bug, 1.0).is_err());
        // The gate-owning caller sees the error; no line rows exist.
        assert!(store.lines(bug.bug_idx).unwrap().is_empty());
    }
}
