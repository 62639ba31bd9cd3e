//! Running per-tag statistics for one time window
//!
//! Mean and variance use Welford's incremental update, so a window with
//! millions of samples does not lose precision the way a sum of squares does.
//! Samples are folded in as whole milliseconds, the same unit Min and Max are
//! published in, so `min <= mean <= max` holds for every snapshot.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;

/// Plain Welford state, no synchronization
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min_ms: Option<u64>,
    max_ms: Option<u64>,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the running state, truncated to whole ms
    pub fn push(&mut self, elapsed: Duration) {
        let ms = whole_ms(elapsed);
        let value = ms as f64;
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min_ms = Some(self.min_ms.map_or(ms, |m| m.min(ms)));
        self.max_ms = Some(self.max_ms.map_or(ms, |m| m.max(ms)));
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean in milliseconds, clamped into `[min, max]` against rounding drift
    pub fn mean_ms(&self) -> f64 {
        match (self.min_ms, self.max_ms) {
            (Some(min), Some(max)) => self.mean.clamp(min as f64, max as f64),
            _ => 0.0,
        }
    }

    /// Population variance in ms², 0 for fewer than two samples
    pub fn variance(&self) -> f64 {
        if self.count <= 1 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    pub fn stddev_ms(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Shortest sample in whole ms, 0 when empty
    pub fn min_ms(&self) -> u64 {
        self.min_ms.unwrap_or(0)
    }

    /// Longest sample in whole ms, 0 when empty
    pub fn max_ms(&self) -> u64 {
        self.max_ms.unwrap_or(0)
    }
}

fn whole_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Fractional milliseconds, exact for any realistic duration
pub fn duration_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Immutable copy of one tag's statistics at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub count: u64,
    /// Mean elapsed time (ms)
    pub mean: f64,
    /// Population standard deviation (ms)
    pub stddev: f64,
    /// Shortest elapsed time (whole ms)
    pub min: u64,
    /// Longest elapsed time (whole ms)
    pub max: u64,
    /// Events per second over the window's elapsed duration
    pub tps: f64,
    pub window_start_ms: u64,
    pub window_end_ms: u64,
}

impl StatsSnapshot {
    /// Snapshot of a window that has seen no events
    pub fn empty(window_start_ms: u64, window_end_ms: u64) -> Self {
        Self {
            count: 0,
            mean: 0.0,
            stddev: 0.0,
            min: 0,
            max: 0,
            tps: 0.0,
            window_start_ms,
            window_end_ms,
        }
    }
}

/// Statistics for a single tag within a single window
///
/// Updates hold the accumulator's own lock for a handful of float operations;
/// accumulators for different tags never share a lock.
#[derive(Debug)]
pub struct TagAccumulator {
    stats: Mutex<RunningStats>,
    window_start_ms: u64,
    window_length_ms: u64,
}

impl TagAccumulator {
    pub fn new(window_start_ms: u64, window_length_ms: u64) -> Self {
        Self {
            stats: Mutex::new(RunningStats::new()),
            window_start_ms,
            window_length_ms,
        }
    }

    pub fn update(&self, elapsed: Duration) {
        self.stats.lock().push(elapsed);
    }

    /// Copy out the current state without deriving anything under the lock
    pub fn running_stats(&self) -> RunningStats {
        *self.stats.lock()
    }

    pub fn count(&self) -> u64 {
        self.stats.lock().count()
    }

    pub fn window_end_ms(&self) -> u64 {
        self.window_start_ms.saturating_add(self.window_length_ms)
    }

    /// Derived statistics as seen at `now_ms`
    ///
    /// Throughput divides by the wall time elapsed since the window opened,
    /// capped at the window length once the window is over.
    pub fn snapshot(&self, now_ms: u64) -> StatsSnapshot {
        let stats = self.running_stats();
        let elapsed_ms = now_ms
            .saturating_sub(self.window_start_ms)
            .clamp(1, self.window_length_ms.max(1));

        StatsSnapshot {
            count: stats.count(),
            mean: stats.mean_ms(),
            stddev: stats.stddev_ms(),
            min: stats.min_ms(),
            max: stats.max_ms(),
            tps: stats.count() as f64 / (elapsed_ms as f64 / 1000.0),
            window_start_ms: self.window_start_ms,
            window_end_ms: self.window_end_ms(),
        }
    }
}
