//! Timing events and the stopwatch line format
//!
//! A [`TimingEvent`] is one measured span of work: a tag, when it started and
//! how long it took. Events render as stopwatch lines
//!
//! ```text
//! start[1230068316117] time[123] tag[db.query] message[select users]
//! ```
//!
//! and parse back from any line that contains such a record, which is how the
//! replay CLI reads existing log files.

use crate::error::ParseError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// One completed timing measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingEvent {
    /// Category label the event is aggregated under
    pub tag: String,
    /// Start time in milliseconds since the Unix epoch
    pub start_ms: u64,
    /// Elapsed wall time of the measured work
    pub elapsed: Duration,
    /// Optional free-text message
    pub message: Option<String>,
}

impl TimingEvent {
    pub fn new(tag: impl Into<String>, start_ms: u64, elapsed: Duration) -> Self {
        Self {
            tag: tag.into(),
            start_ms,
            elapsed,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Elapsed time in fractional milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        crate::accumulator::duration_ms(self.elapsed)
    }

    /// Find and parse a stopwatch record inside an arbitrary log line
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let caps = line_pattern()
            .captures(line)
            .ok_or_else(|| ParseError(line.to_string()))?;

        let start_ms = caps[1]
            .parse::<u64>()
            .map_err(|_| ParseError(line.to_string()))?;
        let elapsed_ms = caps[2]
            .parse::<u64>()
            .map_err(|_| ParseError(line.to_string()))?;

        Ok(Self {
            tag: caps[3].to_string(),
            start_ms,
            elapsed: Duration::from_millis(elapsed_ms),
            message: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for TimingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start[{}] time[{}] tag[{}]",
            self.start_ms,
            self.elapsed.as_millis(),
            self.tag
        )?;
        if let Some(message) = &self.message {
            write!(f, " message[{}]", message)?;
        }
        Ok(())
    }
}

impl FromStr for TimingEvent {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"start\[(\d+)\] time\[(\d+)\] tag\[(.*?)\](?: message\[(.*)\])?")
            .expect("stopwatch line pattern is valid")
    })
}
