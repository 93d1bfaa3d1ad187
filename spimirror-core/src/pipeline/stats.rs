//! Frame-loop throughput statistics.
//!
//! Keeps a rolling window of transfers so the loop can report frames
//! and bytes per second over the last second, plus lifetime counters
//! for each iteration outcome.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Lifetime counters, one per iteration outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    pub transferred: u64,
    pub unchanged: u64,
    pub dropped: u64,
    pub bytes: u64,
}

/// Rolling-window throughput tracker.
pub struct ThroughputMeter {
    /// Samples: `(when, bytes)` for each completed transfer.
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    window_bytes: u64,
    counters: FrameCounters,
}

impl ThroughputMeter {
    /// Meter with a 1-second window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(128),
            window,
            window_bytes: 0,
            counters: FrameCounters::default(),
        }
    }

    pub fn record_transfer(&mut self, bytes: usize) {
        self.record_transfer_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_transfer_at(&mut self, when: Instant, bytes: usize) {
        let bytes = bytes as u64;
        self.samples.push_back((when, bytes));
        self.window_bytes += bytes;
        self.counters.transferred += 1;
        self.counters.bytes += bytes;
        self.evict(when);
    }

    pub fn record_unchanged(&mut self) {
        self.counters.unchanged += 1;
    }

    pub fn record_dropped(&mut self) {
        self.counters.dropped += 1;
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Drop samples older than the window, relative to `now`.
    ///
    /// Rates only move when something is recorded, so call this before
    /// reading them after a quiet period.
    pub fn expire(&mut self, now: Instant) {
        self.evict(now);
    }

    /// Transfers per second over the window.
    pub fn frames_per_second(&self) -> f64 {
        match self.span() {
            Some(secs) => self.samples.len() as f64 / secs,
            None => 0.0,
        }
    }

    /// Bytes per second over the window.
    pub fn bytes_per_second(&self) -> u64 {
        match self.span() {
            Some(secs) => (self.window_bytes as f64 / secs) as u64,
            None => 0,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Seconds between the oldest and newest sample, at least 1 ms.
    /// `None` until the window holds two samples.
    fn span(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let (first, last) = (self.samples.front()?, self.samples.back()?);
        let d = last.0.duration_since(first.0);
        Some(d.max(Duration::from_millis(1)).as_secs_f64())
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.window_bytes = self.window_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
