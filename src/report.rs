//! Window reports for the replay CLI
//!
//! Text output is one table per window:
//!
//! ```text
//! Performance Statistics   60000 - 90000
//! Tag                                      Avg(ms)         Min         Max     Std Dev       Count         TPS
//! db.query                                   120.5          87         301        41.2          17        0.57
//! ```
//!
//! JSON output is one object per line.

use crate::management::TagStatistics;
use serde::Serialize;
use std::io::{self, Write};

/// Statistics of every exposed tag for one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub window_start_ms: u64,
    pub window_end_ms: u64,
    pub statistics: Vec<TagStatistics>,
}

impl WindowReport {
    /// Build a report; `None` when there are no tags to report
    pub fn new(statistics: Vec<TagStatistics>) -> Option<Self> {
        let first = statistics.first()?;
        Some(Self {
            window_start_ms: first.stats.window_start_ms,
            window_end_ms: first.stats.window_end_ms,
            statistics,
        })
    }

    pub fn event_count(&self) -> u64 {
        self.statistics.iter().map(|s| s.stats.count).sum()
    }

    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "Performance Statistics   {} - {}",
            self.window_start_ms, self.window_end_ms
        )?;
        writeln!(
            out,
            "{:<40}{:>8}{:>12}{:>12}{:>12}{:>12}{:>12}",
            "Tag", "Avg(ms)", "Min", "Max", "Std Dev", "Count", "TPS"
        )?;
        for entry in &self.statistics {
            let s = &entry.stats;
            writeln!(
                out,
                "{:<40}{:>8.1}{:>12}{:>12}{:>12.1}{:>12}{:>12.2}",
                entry.tag, s.mean, s.min, s.max, s.stddev, s.count, s.tps
            )?;
        }
        writeln!(out)
    }

    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer(&mut *out, self)?;
        writeln!(out)
    }
}
