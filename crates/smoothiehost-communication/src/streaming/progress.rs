//! Stream progress and ETA estimation

use smoothiehost_core::constants::{ETA_MIN_LINES, ETA_MIN_SECS};
use smoothiehost_core::StreamProgress;
use std::time::{Duration, Instant};

/// Estimate time remaining from the average line rate so far
///
/// Returns `None` until more than [`ETA_MIN_LINES`] lines and
/// [`ETA_MIN_SECS`] seconds have passed, or when the total is unknown.
pub fn estimate_eta(line: u64, total: Option<u64>, elapsed: Duration) -> Option<Duration> {
    let total = total?;
    if line <= ETA_MIN_LINES || elapsed.as_secs() <= ETA_MIN_SECS {
        return None;
    }
    let lines_per_sec = line as f64 / elapsed.as_secs_f64();
    let remaining = total.saturating_sub(line) as f64;
    Some(Duration::from_secs_f64(remaining / lines_per_sec))
}

/// Monotonic line counter for one stream session
#[derive(Debug)]
pub struct ProgressTracker {
    total: Option<u64>,
    line: u64,
    every: u64,
    last_reported: Option<u64>,
    started: Instant,
}

impl ProgressTracker {
    /// Create a tracker that reports every `every` lines
    pub fn new(total: Option<u64>, every: u64) -> Self {
        Self::started_at(total, every, Instant::now())
    }

    /// Create a tracker with an explicit start time
    pub fn started_at(total: Option<u64>, every: u64, started: Instant) -> Self {
        Self {
            total,
            line: 0,
            every: every.max(1),
            last_reported: None,
            started,
        }
    }

    /// Line reached so far
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Total lines, if known
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Adopt a total if none was counted up front
    pub fn set_total_if_unknown(&mut self, total: u64) {
        self.total.get_or_insert(total);
    }

    /// Record a line number, returning a progress value when one is due
    ///
    /// A value is due each time the line crosses a multiple of the report
    /// interval. The counter never goes backwards; an older line number is
    /// ignored.
    pub fn advance(&mut self, line: u64) -> Option<StreamProgress> {
        if line <= self.line {
            return None;
        }
        let crossed = line / self.every > self.line / self.every;
        self.line = line;
        crossed.then(|| self.report())
    }

    /// Current progress value, marking it reported
    pub fn report(&mut self) -> StreamProgress {
        self.last_reported = Some(self.line);
        StreamProgress {
            line: self.line,
            total: self.total,
            eta: estimate_eta(self.line, self.total, self.started.elapsed()),
        }
    }

    /// Check if the current line has been reported already
    pub fn is_reported(&self) -> bool {
        self.last_reported == Some(self.line)
    }
}
