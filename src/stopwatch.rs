//! Call-site timing
//!
//! ```
//! use cronometro::collector::Collector;
//! use cronometro::config::CollectorConfig;
//! use cronometro::stopwatch::StopWatch;
//!
//! let collector = Collector::new(CollectorConfig::default().with_tags(["load"])).unwrap();
//! let watch = StopWatch::start("load");
//! // ... work ...
//! let event = watch.stop(&collector);
//! assert_eq!(event.tag, "load");
//! ```

use crate::clock::epoch_millis;
use crate::event::TimingEvent;
use crossbeam::channel::Sender;
use std::time::{Duration, Instant, SystemTime};

/// Anything completed timing events can be handed to
pub trait TimingSink {
    fn record(&self, event: TimingEvent);
}

impl<T: TimingSink + ?Sized> TimingSink for &T {
    fn record(&self, event: TimingEvent) {
        (**self).record(event)
    }
}

/// Forward events into a channel, e.g. to batch them on another thread
impl TimingSink for Sender<TimingEvent> {
    fn record(&self, event: TimingEvent) {
        if self.send(event).is_err() {
            tracing::debug!("timing sink channel closed, event discarded");
        }
    }
}

/// A running measurement
///
/// Start time is taken from the wall clock, elapsed time from a monotonic
/// [`Instant`], so clock adjustments never produce negative durations.
#[derive(Debug, Clone)]
pub struct StopWatch {
    tag: String,
    message: Option<String>,
    start_ms: u64,
    started: Instant,
}

impl StopWatch {
    pub fn start(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            message: None,
            start_ms: epoch_millis(SystemTime::now()),
            started: Instant::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn event(&self, tag: &str) -> TimingEvent {
        TimingEvent {
            tag: tag.to_string(),
            start_ms: self.start_ms,
            elapsed: self.elapsed(),
            message: self.message.clone(),
        }
    }

    /// Submit the segment so far under `tag` and start timing the next one
    pub fn lap<S: TimingSink>(&mut self, sink: &S, tag: &str) -> TimingEvent {
        let event = self.event(tag);
        sink.record(event.clone());
        self.start_ms = epoch_millis(SystemTime::now());
        self.started = Instant::now();
        event
    }

    /// Submit the measurement under the watch's own tag
    pub fn stop<S: TimingSink>(self, sink: &S) -> TimingEvent {
        let event = self.event(&self.tag);
        sink.record(event.clone());
        event
    }
}

/// Time `f` and submit the result under `tag`
pub fn time<S, F, R>(sink: &S, tag: &str, f: F) -> R
where
    S: TimingSink,
    F: FnOnce() -> R,
{
    let watch = StopWatch::start(tag);
    let result = f();
    watch.stop(sink);
    result
}
