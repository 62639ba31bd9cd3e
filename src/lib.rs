//! Cronometro - windowed per-tag timing statistics
//!
//! Timing events (a tag, a start time and an elapsed time) are folded into
//! running statistics per tag over fixed-length time windows. A chosen set of
//! tags is exposed as named read-only attributes (`<tag>Count`, `<tag>Mean`,
//! `<tag>StdDev`, `<tag>Min`, `<tag>Max`, `<tag>TPS`), and threshold rules
//! raise `OUT_OF_RANGE` notifications to subscribers.

pub mod accumulator;
pub mod cli;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod management;
pub mod notification;
pub mod registry;
pub mod report;
pub mod stopwatch;
pub mod threshold;
pub mod time_slice;

pub use collector::Collector;
pub use config::CollectorConfig;
pub use error::{ConfigurationError, ManagementError, ParseError};
pub use event::TimingEvent;
pub use stopwatch::StopWatch;
