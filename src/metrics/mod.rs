//! Per-stage latency tracking
//!
//! Rolling window of stage timings surfaced through `/api/status`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;

/// Measurements kept per stage
const WINDOW: usize = 100;

/// Summary statistics for one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub count: usize,
}

/// Rolling per-stage latency window
#[derive(Default)]
pub struct LatencyTracker {
    stages: Mutex<HashMap<&'static str, VecDeque<f64>>>,
}

impl LatencyTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one measurement for a stage
    pub fn record(&self, stage: &'static str, ms: f64) {
        let Ok(mut stages) = self.stages.lock() else {
            return;
        };
        let window = stages.entry(stage).or_default();
        window.push_back(ms);
        while window.len() > WINDOW {
            window.pop_front();
        }
    }

    /// Summarize all stages seen so far
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> BTreeMap<String, StageSummary> {
        let Ok(stages) = self.stages.lock() else {
            return BTreeMap::new();
        };
        stages
            .iter()
            .filter(|(_, w)| !w.is_empty())
            .map(|(stage, window)| {
                let sum: f64 = window.iter().sum();
                let min = window.iter().copied().fold(f64::INFINITY, f64::min);
                let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (
                    (*stage).to_string(),
                    StageSummary {
                        avg_ms: round1(sum / window.len() as f64),
                        min_ms: round1(min),
                        max_ms: round1(max),
                        count: window.len(),
                    },
                )
            })
            .collect()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_aggregates_measurements() {
        let tracker = LatencyTracker::new();
        tracker.record("stt", 100.0);
        tracker.record("stt", 200.0);
        tracker.record("tts", 50.0);

        let summary = tracker.summary();
        let stt = &summary["stt"];
        assert_eq!(stt.count, 2);
        assert!((stt.avg_ms - 150.0).abs() < f64::EPSILON);
        assert!((stt.min_ms - 100.0).abs() < f64::EPSILON);
        assert!((stt.max_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(summary["tts"].count, 1);
    }

    #[test]
    fn window_drops_oldest() {
        let tracker = LatencyTracker::new();
        for i in 0..150 {
            tracker.record("llm", f64::from(i));
        }
        let summary = tracker.summary();
        assert_eq!(summary["llm"].count, WINDOW);
        assert!((summary["llm"].min_ms - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_tracker_is_empty() {
        assert!(LatencyTracker::new().summary().is_empty());
    }
}
