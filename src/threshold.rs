//! Threshold rules and their evaluation
//!
//! Rules come from a comma-separated expression such as
//!
//! ```text
//! tag0(<1000), db.queryMean(<200), httpTPS(5-500), *(<30000)
//! ```
//!
//! - `tag(<range>)` bounds the raw elapsed time of every event for `tag`
//! - `tag<Statistic>(<range>)` bounds a window aggregate (`Count`, `Mean`,
//!   `StdDev`, `Min`, `Max`, `TPS`) right after the event is folded in
//! - `*` / `*<Statistic>` are defaults for tags without rules of their own
//!
//! Ranges are `<N`, `>N` or `N-M` (inclusive). Values are milliseconds for
//! time statistics, events/sec for `TPS` and a plain number for `Count`.
//! Parsing happens once, at configuration time, and rejects anything else.

use crate::accumulator::StatsSnapshot;
use crate::error::{ConfigurationError, Result};
use crate::event::TimingEvent;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// The quantity a rule bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Statistic {
    /// Raw elapsed time of the single event
    Elapsed,
    Count,
    Mean,
    StdDev,
    Min,
    Max,
    #[serde(rename = "TPS")]
    Tps,
}

impl Statistic {
    /// The six aggregates exposed per tag, in attribute order
    pub const EXPOSED: [Statistic; 6] = [
        Statistic::Count,
        Statistic::Mean,
        Statistic::StdDev,
        Statistic::Min,
        Statistic::Max,
        Statistic::Tps,
    ];

    /// Attribute-name suffix (`tag0` + `Mean`)
    pub fn suffix(self) -> &'static str {
        match self {
            Statistic::Elapsed => "",
            Statistic::Count => "Count",
            Statistic::Mean => "Mean",
            Statistic::StdDev => "StdDev",
            Statistic::Min => "Min",
            Statistic::Max => "Max",
            Statistic::Tps => "TPS",
        }
    }

    /// Split `tag0StdDev` into `("tag0", StdDev)`; names without a known
    /// suffix are not aggregate attributes
    pub fn split_attribute(name: &str) -> Option<(&str, Statistic)> {
        Self::EXPOSED.iter().find_map(|&stat| {
            name.strip_suffix(stat.suffix())
                .filter(|tag| !tag.is_empty())
                .map(|tag| (tag, stat))
        })
    }

    /// Read this statistic out of a snapshot
    pub fn read(self, snapshot: &StatsSnapshot) -> Option<f64> {
        match self {
            Statistic::Elapsed => None,
            Statistic::Count => Some(snapshot.count as f64),
            Statistic::Mean => Some(snapshot.mean),
            Statistic::StdDev => Some(snapshot.stddev),
            Statistic::Min => Some(snapshot.min as f64),
            Statistic::Max => Some(snapshot.max as f64),
            Statistic::Tps => Some(snapshot.tps),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Elapsed => f.write_str("Elapsed"),
            other => f.write_str(other.suffix()),
        }
    }
}

/// Values a statistic may take without raising a notification
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AcceptableRange {
    Below(f64),
    Above(f64),
    Between(f64, f64),
}

impl AcceptableRange {
    pub fn contains(&self, value: f64) -> bool {
        match *self {
            AcceptableRange::Below(max) => value < max,
            AcceptableRange::Above(min) => value > min,
            AcceptableRange::Between(min, max) => (min..=max).contains(&value),
        }
    }

    fn parse(text: &str, expr: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigurationError::InvalidThreshold {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        let number = |s: &str| -> Result<f64> {
            let value: f64 = s
                .trim()
                .parse()
                .map_err(|_| invalid(&format!("'{}' is not a number", s.trim())))?;
            if !value.is_finite() || value < 0.0 {
                return Err(invalid("bounds must be finite and non-negative"));
            }
            Ok(value)
        };

        let text = text.trim();
        if let Some(rest) = text.strip_prefix('<') {
            Ok(AcceptableRange::Below(number(rest)?))
        } else if let Some(rest) = text.strip_prefix('>') {
            Ok(AcceptableRange::Above(number(rest)?))
        } else if let Some((low, high)) = text.split_once('-') {
            let (low, high) = (number(low)?, number(high)?);
            if low > high {
                return Err(invalid("range lower bound exceeds upper bound"));
            }
            Ok(AcceptableRange::Between(low, high))
        } else {
            Err(invalid("range must be <N, >N or N-M"))
        }
    }
}

impl fmt::Display for AcceptableRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptableRange::Below(max) => write!(f, "<{}", max),
            AcceptableRange::Above(min) => write!(f, ">{}", min),
            AcceptableRange::Between(min, max) => write!(f, "{}-{}", min, max),
        }
    }
}

/// One parsed rule; `tag == None` marks a default rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdRule {
    pub tag: Option<String>,
    pub statistic: Statistic,
    pub range: AcceptableRange,
}

impl ThresholdRule {
    /// Parse a single `attribute(range)` entry
    pub fn parse(entry: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigurationError::InvalidThreshold {
            expr: entry.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = entry.trim();
        let open = trimmed
            .find('(')
            .ok_or_else(|| invalid("expected attribute(range)"))?;
        let inner = trimmed[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| invalid("missing closing ')'"))?;
        let attribute = trimmed[..open].trim();
        if attribute.is_empty() {
            return Err(invalid("missing attribute name"));
        }

        let range = AcceptableRange::parse(inner, entry)?;
        let (tag, statistic) = match Statistic::split_attribute(attribute) {
            Some((tag, stat)) => (tag, stat),
            None => (attribute, Statistic::Elapsed),
        };
        let tag = (tag != "*").then(|| tag.to_string());

        Ok(Self {
            tag,
            statistic,
            range,
        })
    }

    /// The value this rule looks at, if it can be computed
    pub fn observe(&self, event: &TimingEvent, snapshot: Option<&StatsSnapshot>) -> Option<f64> {
        match self.statistic {
            Statistic::Elapsed => Some(event.elapsed_ms()),
            stat => snapshot.and_then(|s| stat.read(s)),
        }
    }
}

/// A rule that an event (or its window) fell outside of
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breach {
    pub statistic: Statistic,
    pub observed: f64,
    pub range: AcceptableRange,
}

/// Per-tag rule table, checked on every ingested event
#[derive(Debug, Clone, Default)]
pub struct ThresholdEvaluator {
    by_tag: HashMap<String, Vec<ThresholdRule>>,
    defaults: Vec<ThresholdRule>,
}

impl ThresholdEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a full threshold expression; an empty expression has no rules
    pub fn parse(expr: &str) -> Result<Self> {
        let mut evaluator = Self::new();
        for entry in split_entries(expr) {
            evaluator.add_rule(ThresholdRule::parse(entry)?);
        }
        Ok(evaluator)
    }

    pub fn add_rule(&mut self, rule: ThresholdRule) {
        match &rule.tag {
            Some(tag) => self.by_tag.entry(tag.clone()).or_default().push(rule),
            None => self.defaults.push(rule),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty() && self.defaults.is_empty()
    }

    /// Rules that apply to `tag`: its own, or the defaults if it has none
    pub fn rules_for(&self, tag: &str) -> &[ThresholdRule] {
        self.by_tag
            .get(tag)
            .map(Vec::as_slice)
            .unwrap_or(&self.defaults[..])
    }

    /// Whether any rule for `tag` needs the window aggregate
    pub fn needs_snapshot(&self, tag: &str) -> bool {
        self.rules_for(tag)
            .iter()
            .any(|r| r.statistic != Statistic::Elapsed)
    }

    /// Check one event; aggregate rules are skipped when no snapshot exists
    pub fn evaluate(&self, event: &TimingEvent, snapshot: Option<&StatsSnapshot>) -> Vec<Breach> {
        self.rules_for(&event.tag)
            .iter()
            .filter_map(|rule| {
                let observed = rule.observe(event, snapshot)?;
                (!rule.range.contains(observed)).then_some(Breach {
                    statistic: rule.statistic,
                    observed,
                    range: rule.range,
                })
            })
            .collect()
    }
}

/// Split on commas that are not inside parentheses
fn split_entries(expr: &str) -> impl Iterator<Item = &str> {
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut entries = Vec::new();
    for (i, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&expr[start..]);
    entries.into_iter().filter(|e| !e.trim().is_empty())
}
