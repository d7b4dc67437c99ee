//! Coverage reduction.
//!
//! Given every test's full-space vector, derive the failing-test
//! footprint F (bitwise OR of failing vectors), renumber its set bits
//! densely into the candidate space, reproject each test into that
//! space, and classify non-failing tests as relevant or irrelevant by
//! intersection with F.

use crate::bitvec::CovBitVec;
use crate::indexer::FullIndexSpace;
use mbfl_types::LineKey;

/// Bitwise OR of a set of same-width vectors. The empty merge is the
/// zero vector of the given width.
pub fn merge<'a, I>(vectors: I, width: usize) -> CovBitVec
where
    I: IntoIterator<Item = &'a CovBitVec>,
{
    let mut out = CovBitVec::zeroed(width);
    for v in vectors {
        out.or_assign(v);
    }
    out
}

/// Indices of tests whose vector shares no set bit with the footprint.
/// Callers pass only passing/cctc tests; failing tests are relevant by
/// construction.
pub fn identify_not_relevant<'a, I>(tests: I, footprint: &CovBitVec) -> Vec<u32>
where
    I: IntoIterator<Item = (u32, &'a CovBitVec)>,
{
    let mut out = Vec::new();
    for (tc_idx, v) in tests {
        if !v.intersects(footprint) {
            out.push(tc_idx);
        }
    }
    out
}

/// The reduced (candidate) index space: the set bits of the failing
/// footprint, renumbered densely in the same relative order.
#[derive(Debug, Clone)]
pub struct CandidateSpace {
    /// Full-space index of each candidate, ascending.
    full_indices: Vec<usize>,
    /// Canonical key of each candidate, in reduced index order.
    keys: Vec<LineKey>,
}

impl CandidateSpace {
    /// Derive the candidate space from the failing footprint.
    pub fn from_footprint(footprint: &CovBitVec, full: &FullIndexSpace) -> Self {
        let full_indices = footprint.ones();
        let keys = full_indices
            .iter()
            .map(|&i| full.key(i).clone())
            .collect();
        Self { full_indices, keys }
    }

    /// Candidate count (the reduced vector width). Always equals the
    /// footprint's popcount.
    pub fn width(&self) -> usize {
        self.full_indices.len()
    }

    pub fn keys(&self) -> &[LineKey] {
        &self.keys
    }

    /// Reduced index of a canonical key, if it is a candidate.
    pub fn reduced_index_of(&self, key: &LineKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    /// Reproject a full-space vector into the candidate space: drop
    /// non-candidate bits, renumber the rest. Injective and
    /// order-preserving on the candidate set.
    pub fn reproject(&self, full_vec: &CovBitVec) -> CovBitVec {
        let mut out = CovBitVec::zeroed(self.width());
        for (reduced_idx, &full_idx) in self.full_indices.iter().enumerate() {
            if full_vec.get(full_idx) {
                out.set(reduced_idx);
            }
        }
        out
    }
}

/// Lift a reduced vector back into the full space. Used to check the
/// reduce/unreduce round trip: the result is always a subset of the
/// footprint the space was derived from.
pub fn unreduce(reduced: &CovBitVec, space: &CandidateSpace, full_width: usize) -> CovBitVec {
    let mut out = CovBitVec::zeroed(full_width);
    for (reduced_idx, &full_idx) in space.full_indices.iter().enumerate() {
        if reduced.get(reduced_idx) {
            out.set(full_idx);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::LineIndexer;
    use crate::report::{CoverageReport, FileCoverage, FunctionBoundaries, LineExecution};

    fn from_ones(width: usize, ones: &[usize]) -> CovBitVec {
        let mut v = CovBitVec::zeroed(width);
        for &i in ones {
            v.set(i);
        }
        v
    }

    #[test]
    fn merge_identity_and_empty() {
        let v = from_ones(8, &[1, 5]);
        assert!(merge([], 8).is_zero());
        assert_eq!(merge([&v], 8), v);
    }

    #[test]
    fn merge_is_order_insensitive() {
        let a = from_ones(12, &[0, 3]);
        let b = from_ones(12, &[3, 7]);
        let c = from_ones(12, &[11]);
        let expected = from_ones(12, &[0, 3, 7, 11]);
        assert_eq!(merge([&a, &b, &c], 12), expected);
        assert_eq!(merge([&c, &a, &b], 12), expected);
        assert_eq!(merge([&b, &c, &a], 12), expected);
        // Associativity: fold in two different groupings.
        let ab = merge([&a, &b], 12);
        let bc = merge([&b, &c], 12);
        assert_eq!(merge([&ab, &c], 12), merge([&a, &bc], 12));
    }

    #[test]
    fn relevance_classification() {
        let f = from_ones(10, &[3, 7, 9]);
        let equal_to_f = f.clone();
        let overlapping = from_ones(10, &[7, 2]);
        let zero = CovBitVec::zeroed(10);
        let disjoint = from_ones(10, &[0, 1]);

        assert!(identify_not_relevant([], &f).is_empty());
        let not_relevant = identify_not_relevant(
            [(1, &equal_to_f), (2, &overlapping), (3, &zero), (4, &disjoint)],
            &f,
        );
        assert_eq!(not_relevant, vec![3, 4]);
    }

    // Scenario from the pipeline contract: failing test covers lines
    // {3,7,9} of a 30-line space; passing test A covers {7,9,20};
    // passing test B covers {20} only.
    #[test]
    fn candidate_set_and_relevance_scenario() {
        let failing = from_ones(30, &[3, 7, 9]);
        let passing_a = from_ones(30, &[7, 9, 20]);
        let passing_b = from_ones(30, &[20]);

        let footprint = merge([&failing], 30);
        assert_eq!(footprint.ones(), vec![3, 7, 9]);

        let boundaries = FunctionBoundaries::default();
        let report = CoverageReport {
            files: vec![FileCoverage {
                file: "a.c".into(),
                lines: (0..30)
                    .map(|i| LineExecution { line_number: i, count: 1 })
                    .collect(),
            }],
        };
        let mut indexer = LineIndexer::new("subj", &boundaries);
        indexer.add_report(&report);
        let full = indexer.build();
        assert_eq!(full.width(), 30);

        let space = CandidateSpace::from_footprint(&footprint, &full);
        assert_eq!(space.width(), footprint.popcount());

        let reduced_a = space.reproject(&passing_a);
        assert_eq!(reduced_a.ones(), vec![1, 2]); // lines 7 and 9
        assert!(!identify_not_relevant([(10, &passing_a)], &footprint).contains(&10));
        assert_eq!(identify_not_relevant([(11, &passing_b)], &footprint), vec![11]);
    }

    #[test]
    fn reduce_unreduce_round_trip_is_subset_of_footprint() {
        let failing_1 = from_ones(16, &[2, 5, 11]);
        let failing_2 = from_ones(16, &[5, 13]);
        let footprint = merge([&failing_1, &failing_2], 16);

        let boundaries = FunctionBoundaries::default();
        let report = CoverageReport {
            files: vec![FileCoverage {
                file: "a.c".into(),
                lines: (0..16)
                    .map(|i| LineExecution { line_number: i, count: 1 })
                    .collect(),
            }],
        };
        let mut indexer = LineIndexer::new("subj", &boundaries);
        indexer.add_report(&report);
        let full = indexer.build();
        let space = CandidateSpace::from_footprint(&footprint, &full);

        for failing in [&failing_1, &failing_2] {
            let reduced = space.reproject(failing);
            let lifted = unreduce(&reduced, &space, 16);
            assert_eq!(lifted, *failing); // failing footprints lie inside F
            assert!(lifted.is_subset_of(&footprint));
        }
    }

    #[test]
    fn reprojection_is_injective_and_order_preserving() {
        let footprint = from_ones(20, &[1, 4, 9, 16]);
        let boundaries = FunctionBoundaries::default();
        let report = CoverageReport {
            files: vec![FileCoverage {
                file: "a.c".into(),
                lines: (0..20)
                    .map(|i| LineExecution { line_number: i, count: 1 })
                    .collect(),
            }],
        };
        let mut indexer = LineIndexer::new("subj", &boundaries);
        indexer.add_report(&report);
        let full = indexer.build();
        let space = CandidateSpace::from_footprint(&footprint, &full);

        // Each candidate maps to a distinct reduced index, in order.
        let reduced_indices: Vec<usize> = footprint
            .ones()
            .iter()
            .map(|&i| space.reproject(&from_ones(20, &[i])).ones()[0])
            .collect();
        assert_eq!(reduced_indices, vec![0, 1, 2, 3]);
    }
}
