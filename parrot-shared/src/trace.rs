//! The normalized edge-trace representation shared by capture and replay.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One recorded level change on the receiver line.
///
/// `ts_us` is the time of the change in microseconds, relative to the first
/// edge of the trace. `level` is the logical state the line settled into
/// (`true` = mark, after any inversion has been applied).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub ts_us: u64,
    pub level: bool,
}

impl Edge {
    pub const fn new(ts_us: u64, level: bool) -> Self {
        Edge { ts_us, level }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("trace must start at timestamp 0, found {ts_us}")]
    NonZeroStart { ts_us: u64 },
    #[error("edge {index} does not advance in time ({prev_us} -> {ts_us})")]
    NonMonotonic { index: usize, prev_us: u64, ts_us: u64 },
    #[error("edge {index} repeats the previous level")]
    RepeatedLevel { index: usize },
}

/// A validated sequence of level changes.
///
/// Invariants, guaranteed for every constructed value:
/// * timestamps are strictly increasing,
/// * consecutive edges carry different levels,
/// * a non-empty trace starts at timestamp 0.
///
/// The only ways to build one are [`EdgeRecorder`] (which normalizes raw
/// samples) and [`SignalTrace::try_from_edges`] (which rejects violations),
/// so the rest of the crate treats these invariants as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Edge>", into = "Vec<Edge>")]
pub struct SignalTrace {
    edges: Vec<Edge>,
}

impl SignalTrace {
    /// A trace with no edges. Valid input everywhere; replaying it is a no-op.
    pub fn empty() -> Self {
        SignalTrace { edges: Vec::new() }
    }

    /// Validates `edges` against the trace invariants.
    pub fn try_from_edges(edges: Vec<Edge>) -> Result<Self, TraceError> {
        let trace = SignalTrace { edges };
        trace.check()?;
        Ok(trace)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Time from the first edge to the last, in microseconds.
    pub fn span_us(&self) -> u64 {
        self.edges.last().map(|e| e.ts_us).unwrap_or(0)
    }

    fn check(&self) -> Result<(), TraceError> {
        let mut prev: Option<&Edge> = None;
        for (index, edge) in self.edges.iter().enumerate() {
            match prev {
                None => {
                    if edge.ts_us != 0 {
                        return Err(TraceError::NonZeroStart { ts_us: edge.ts_us });
                    }
                }
                Some(p) => {
                    if edge.ts_us <= p.ts_us {
                        return Err(TraceError::NonMonotonic {
                            index,
                            prev_us: p.ts_us,
                            ts_us: edge.ts_us,
                        });
                    }
                    if edge.level == p.level {
                        return Err(TraceError::RepeatedLevel { index });
                    }
                }
            }
            prev = Some(edge);
        }
        Ok(())
    }

    /// Turns raw recorder output into a normalized trace.
    ///
    /// The first record only marks where sampling began, not a real level
    /// change, so it is dropped and the remaining timestamps are rebased so
    /// the first kept edge sits at 0. Fewer than two raw records means the
    /// line never changed state: that is an empty trace.
    fn normalize(mut raw: Vec<Edge>) -> Self {
        if raw.len() < 2 {
            return SignalTrace::empty();
        }
        raw.remove(0);
        let base = raw[0].ts_us;
        for edge in raw.iter_mut() {
            edge.ts_us -= base;
        }
        let trace = SignalTrace { edges: raw };
        debug_assert!(trace.check().is_ok(), "recorder produced an invalid trace");
        trace
    }
}

impl TryFrom<Vec<Edge>> for SignalTrace {
    type Error = TraceError;

    fn try_from(edges: Vec<Edge>) -> Result<Self, TraceError> {
        SignalTrace::try_from_edges(edges)
    }
}

impl From<SignalTrace> for Vec<Edge> {
    fn from(trace: SignalTrace) -> Vec<Edge> {
        trace.edges
    }
}

/// Builds a [`SignalTrace`] from a stream of timestamped line samples.
///
/// Feed it every sample taken from the input line; it keeps only the samples
/// where the (possibly inverted) level differs from the previous kept one.
/// Timestamps must not go backwards between calls.
pub struct EdgeRecorder {
    invert: bool,
    last_level: Option<bool>,
    records: Vec<Edge>,
}

impl EdgeRecorder {
    pub fn new(invert: bool) -> Self {
        EdgeRecorder {
            invert,
            last_level: None,
            records: Vec::new(),
        }
    }

    /// Records `raw_level` as seen at `ts_us` if it is a transition.
    ///
    /// A sample that does not advance the clock past the previous transition
    /// is ignored; the change is picked up by a later sample if the line is
    /// still in its new state. This is the sampling resolution limit.
    pub fn sample(&mut self, ts_us: u64, raw_level: bool) {
        let level = if self.invert { !raw_level } else { raw_level };
        if self.last_level == Some(level) {
            return;
        }
        if let Some(prev) = self.records.last() {
            debug_assert!(ts_us >= prev.ts_us, "sample timestamps ran backwards");
            if ts_us <= prev.ts_us {
                return;
            }
        }
        self.records.push(Edge::new(ts_us, level));
        self.last_level = Some(level);
    }

    /// Number of raw records seen so far, the sentinel first record included.
    pub fn raw_len(&self) -> usize {
        self.records.len()
    }

    /// Finishes recording and normalizes the result.
    pub fn finish(self) -> SignalTrace {
        SignalTrace::normalize(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_normalizes_sample_stream() {
        // Raw line: 1 1 1 0 0 1 1 sampled every 5 us.
        let raw = [true, true, true, false, false, true, true];
        let mut recorder = EdgeRecorder::new(false);
        for (i, level) in raw.iter().enumerate() {
            recorder.sample(i as u64 * 5, *level);
        }
        let trace = recorder.finish();
        assert_eq!(trace.edges(), &[Edge::new(0, false), Edge::new(10, true)]);
        assert_eq!(trace.span_us(), 10);
    }

    #[test]
    fn test_recorder_applies_inversion() {
        let raw = [true, true, false, false];
        let mut recorder = EdgeRecorder::new(true);
        for (i, level) in raw.iter().enumerate() {
            recorder.sample(i as u64 * 10, *level);
        }
        let trace = recorder.finish();
        // Inverted: the line going low reads as the mark turning on.
        assert_eq!(trace.edges(), &[Edge::new(0, true)]);
    }

    #[test]
    fn test_steady_line_yields_empty_trace() {
        let mut recorder = EdgeRecorder::new(false);
        for i in 0..100 {
            recorder.sample(i * 10, true);
        }
        assert_eq!(recorder.raw_len(), 1);
        let trace = recorder.finish();
        assert!(trace.is_empty());
        assert_eq!(trace.span_us(), 0);
    }

    #[test]
    fn test_single_transition_yields_one_edge() {
        let mut recorder = EdgeRecorder::new(false);
        recorder.sample(0, true);
        recorder.sample(40, false);
        let trace = recorder.finish();
        assert_eq!(trace.edges(), &[Edge::new(0, false)]);
    }

    #[test]
    fn test_empty_recorder_finishes_empty() {
        let trace = EdgeRecorder::new(false).finish();
        assert!(trace.is_empty());
    }

    #[test]
    fn test_try_from_edges_accepts_valid_sequences() {
        assert!(SignalTrace::try_from_edges(Vec::new()).is_ok());
        let edges = vec![
            Edge::new(0, true),
            Edge::new(560, false),
            Edge::new(1120, true),
        ];
        let trace = SignalTrace::try_from_edges(edges.clone()).unwrap();
        assert_eq!(trace.edges(), edges.as_slice());
    }

    #[test]
    fn test_try_from_edges_rejects_nonzero_start() {
        let err = SignalTrace::try_from_edges(vec![Edge::new(5, true)]).unwrap_err();
        assert_eq!(err, TraceError::NonZeroStart { ts_us: 5 });
    }

    #[test]
    fn test_try_from_edges_rejects_stalled_timestamps() {
        let err = SignalTrace::try_from_edges(vec![Edge::new(0, true), Edge::new(0, false)])
            .unwrap_err();
        assert_eq!(
            err,
            TraceError::NonMonotonic {
                index: 1,
                prev_us: 0,
                ts_us: 0
            }
        );
    }

    #[test]
    fn test_try_from_edges_rejects_repeated_level() {
        let err = SignalTrace::try_from_edges(vec![Edge::new(0, true), Edge::new(10, true)])
            .unwrap_err();
        assert_eq!(err, TraceError::RepeatedLevel { index: 1 });
    }

    #[test]
    fn test_serde_round_trip() {
        let trace = SignalTrace::try_from_edges(vec![
            Edge::new(0, true),
            Edge::new(600, false),
        ])
        .unwrap();
        let json = serde_json::to_string(&trace).unwrap();
        let back: SignalTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trace);
    }

    #[test]
    fn test_serde_rejects_invalid_trace() {
        let json = r#"[{"ts_us":0,"level":true},{"ts_us":10,"level":true}]"#;
        assert!(serde_json::from_str::<SignalTrace>(json).is_err());
    }
}
