//! Crash backtrace parsing and per-line relevance scoring.
//!
//! Each failing test contributes one ordered (innermost-first) gdb
//! backtrace. Candidate lines are scored by how close they sit to a
//! frame of the same (file, function), weighted down the call stack:
//!
//! ```text
//! score        = 1/(trace_index+1) * exp(-distance^2 / scale)
//! score_linear = 1/(trace_index+1) * 1/(distance+1)
//! ```
//!
//! A line's final relevance is the best-scoring matching frame, not a
//! sum: the closest, most call-proximal frame dominates.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use mbfl_types::{canonical_source_path, LineKey};

/// Matches gdb frame lines in both observed shapes:
/// `#0  func (...) at file:line` and
/// `#1  0xaddr in func (...) at file:line`.
fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"#(\d+)\s+(?:0x[0-9a-f]+\s+in\s+)?([^\s(]+).*?\sat\s+([^:]+):(\d+)")
            .expect("frame pattern is valid")
    })
}

/// One parsed backtrace frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position in the backtrace, 0 = innermost.
    pub trace_index: u32,
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Parse one backtrace. Non-matching lines are skipped, not fatal:
/// gdb interleaves source echo and register noise with frames.
pub fn parse_trace(text: &str) -> Vec<Frame> {
    let pattern = frame_pattern();
    text.lines()
        .filter_map(|line| {
            let caps = pattern.captures(line)?;
            Some(Frame {
                trace_index: caps[1].parse().ok()?,
                function: caps[2].to_string(),
                file: caps[3].to_string(),
                line: caps[4].parse().ok()?,
            })
        })
        .collect()
}

/// Relevance features for one candidate line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StRelevance {
    /// Gaussian-decay score; 0.0 when no frame matches.
    pub score: f64,
    /// Linear-decay variant from the same winning frame.
    pub linear: f64,
    /// Line distance to the winning frame; None when no frame matches.
    pub distance: Option<u32>,
}

impl StRelevance {
    const NONE: StRelevance = StRelevance {
        score: 0.0,
        linear: 0.0,
        distance: None,
    };
}

/// All frames of a bug's failing traces, indexed by canonical
/// (file, function) for scoring.
#[derive(Debug, Default)]
pub struct TraceIndex {
    frames: HashMap<(String, String), Vec<(u32, u32)>>, // (line, trace_index)
}

impl TraceIndex {
    /// Build from every failing test's stacktrace text. Traces are
    /// lowercased before parsing and keys are subject-relative, so
    /// lookups are insensitive to slot directories and case.
    pub fn build<'a, I>(traces: I, subject: &str) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut frames: HashMap<(String, String), Vec<(u32, u32)>> = HashMap::new();
        for trace in traces {
            for frame in parse_trace(&trace.to_lowercase()) {
                let file = canonical_source_path(&frame.file, subject);
                frames
                    .entry((file, frame.function))
                    .or_default()
                    .push((frame.line, frame.trace_index));
            }
        }
        Self { frames }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Score one candidate line against every matching frame. The
    /// candidate's function name is compared with its parameter list
    /// stripped; its file is compared subject-relative.
    pub fn score_line(&self, key: &LineKey, subject: &str, scale: f64) -> StRelevance {
        let file = canonical_source_path(&key.file, subject).to_lowercase();
        let function = match key.function.find('(') {
            Some(idx) => &key.function[..idx],
            None => key.function.as_str(),
        }
        .to_lowercase();

        let Some(entries) = self.frames.get(&(file, function)) else {
            return StRelevance::NONE;
        };

        let mut best = StRelevance::NONE;
        for &(frame_line, trace_index) in entries {
            let distance = frame_line.abs_diff(key.lineno);
            let index_weight = 1.0 / (trace_index as f64 + 1.0);
            let score = index_weight * (-((distance as f64).powi(2)) / scale).exp();
            let linear = index_weight * (1.0 / (distance as f64 + 1.0));
            if score > best.score || best.distance.is_none() {
                best = StRelevance {
                    score,
                    linear,
                    distance: Some(distance),
                };
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "\
#0  foo (p=0x55) at /work/core1/subj/a.c:10
#1  0x00005555 in bar (q=3) at /work/core1/subj/a.c:50
some non-frame noise
#2  main () at /work/core1/subj/main.c:99
";

    #[test]
    fn parses_frames_and_skips_noise() {
        let frames = parse_trace(TRACE);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].function, "foo");
        assert_eq!(frames[0].line, 10);
        assert_eq!(frames[1].trace_index, 1);
        assert_eq!(frames[1].function, "bar");
        assert_eq!(frames[2].file, "/work/core1/subj/main.c");
    }

    // Contract scenario: frame #0 `foo at a.c:10` scores candidate
    // (a.c, foo, 10) at 1*e^0 = 1.0; frame #1 `bar at a.c:50` scores
    // candidate (a.c, bar, 48) at 0.5*e^-4.
    #[test]
    fn scoring_scenario() {
        let index = TraceIndex::build([TRACE], "subj");

        let exact = index.score_line(&LineKey::new("a.c", "foo", 10), "subj", 1.0);
        assert!((exact.score - 1.0).abs() < 1e-12);
        assert_eq!(exact.distance, Some(0));
        assert!((exact.linear - 1.0).abs() < 1e-12);

        let near = index.score_line(&LineKey::new("a.c", "bar", 48), "subj", 1.0);
        assert!((near.score - 0.5 * (-4.0f64).exp()).abs() < 1e-12);
        assert_eq!(near.distance, Some(2));
        assert!((near.linear - 0.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn no_match_scores_zero() {
        let index = TraceIndex::build([TRACE], "subj");
        let miss = index.score_line(&LineKey::new("b.c", "foo", 10), "subj", 1.0);
        assert_eq!(miss, StRelevance { score: 0.0, linear: 0.0, distance: None });
    }

    #[test]
    fn best_frame_dominates_not_sums() {
        // Two frames in the same function; the closer one must win and
        // the scores must not accumulate.
        let trace = "\
#0  foo () at subj/a.c:10
#3  foo () at subj/a.c:11
";
        let index = TraceIndex::build([trace], "subj");
        let rel = index.score_line(&LineKey::new("a.c", "foo", 11), "subj", 1.0);
        // Frame #3 is exact (distance 0, weight 1/4); frame #0 is at
        // distance 1 (weight 1, gaussian e^-1 ~ 0.368). Max wins.
        assert!((rel.score - 0.368).abs() < 1e-3);
        assert_eq!(rel.distance, Some(1));
    }

    #[test]
    fn candidate_function_parameters_are_stripped() {
        let index = TraceIndex::build([TRACE], "subj");
        let rel = index.score_line(&LineKey::new("a.c", "foo(struct st *)", 10), "subj", 1.0);
        assert!((rel.score - 1.0).abs() < 1e-12);
    }
}
