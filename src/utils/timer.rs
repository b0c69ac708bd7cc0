//! Stage timing
//!
//! Records how long each step of a sequential run took. Uses the tokio
//! clock so timings follow a paused test clock.

use std::time::Duration;
use tokio::time::Instant;

/// Per-step durations of a sequential run
#[derive(Debug)]
pub struct StageTimer {
    start: Instant,
    last: Instant,
    stages: Vec<(String, Duration)>,
}

impl StageTimer {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            stages: Vec::new(),
        }
    }

    /// Close the current step under `label`; returns its duration
    pub fn finish(&mut self, label: impl Into<String>) -> Duration {
        let now = Instant::now();
        let took = now - self.last;
        self.last = now;
        self.stages.push((label.into(), took));
        took
    }

    pub fn total(&self) -> Duration {
        self.last - self.start
    }

    pub fn total_ms(&self) -> u64 {
        self.total().as_millis() as u64
    }

    /// The step that took longest
    pub fn slowest(&self) -> Option<(&str, Duration)> {
        self.stages
            .iter()
            .max_by_key(|(_, took)| *took)
            .map(|(label, took)| (label.as_str(), *took))
    }

    /// One numbered line per step, then the total
    pub fn breakdown(&self) -> String {
        let mut output = String::new();
        for (i, (label, took)) in self.stages.iter().enumerate() {
            output.push_str(&format!(
                "  [{:>2}] {:24} {:>7}ms\n",
                i + 1,
                label,
                took.as_millis()
            ));
        }
        output.push_str(&format!("  total {:>29}ms", self.total_ms()));
        output
    }
}
