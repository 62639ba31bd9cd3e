//! The engine: ingestion, thresholds and teardown in one owned value
//!
//! A [`Collector`] is built explicitly from a [`CollectorConfig`] and owns
//! everything it needs. There is no process-wide registry; two collectors
//! never share state.
//!
//! ```text
//! submit() ─► AttributeRegistry::record ─► TimeSliceManager ─► TagAccumulator
//!                    │
//!                    ▼
//!          ThresholdEvaluator ─► NotificationEmitter ─► subscriber queues
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::event::TimingEvent;
use crate::management::ManagementInterface;
use crate::notification::{
    Notification, NotificationEmitter, NotificationListener, SubscriptionId,
};
use crate::registry::AttributeRegistry;
use crate::stopwatch::TimingSink;
use crate::threshold::ThresholdEvaluator;
use crate::time_slice::TimeSliceManager;
use arc_swap::ArcSwap;
use crossbeam::channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Aggregates timing events into exposed, windowed statistics
pub struct Collector {
    registry: Arc<AttributeRegistry>,
    thresholds: ArcSwap<ThresholdEvaluator>,
    emitter: Arc<NotificationEmitter>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl Collector {
    /// Build a collector on the system clock
    pub fn new(config: CollectorConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a collector on an injected time source
    ///
    /// Validates the configuration and parses thresholds before anything is
    /// registered, then activates `tag_names_to_expose` (when non-empty) under
    /// the configured collision policy.
    pub fn with_clock(config: CollectorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let thresholds = config.thresholds()?;

        let slices = TimeSliceManager::new(config.slice_length_ms, clock.now_ms());
        let registry = Arc::new(AttributeRegistry::new(
            config.identity.clone(),
            slices,
            config.create_rollup_statistics,
        ));
        if !config.tag_names_to_expose.is_empty() {
            registry.activate(&config.tag_names_to_expose, config.collision)?;
        }

        let emitter = Arc::new(NotificationEmitter::new(
            config.notification_capacity,
            config.overflow,
        ));

        tracing::info!(
            identity = %config.identity,
            slice_length_ms = config.slice_length_ms,
            exposed = config.tag_names_to_expose.len(),
            "collector started"
        );

        Ok(Self {
            registry,
            thresholds: ArcSwap::from_pointee(thresholds),
            emitter,
            clock,
            closed: AtomicBool::new(false),
        })
    }

    pub fn identity(&self) -> &str {
        self.registry.identity()
    }

    /// Record one timing event
    pub fn submit(
        &self,
        tag: impl Into<String>,
        start_ms: u64,
        elapsed: Duration,
        message: Option<String>,
    ) {
        let mut event = TimingEvent::new(tag, start_ms, elapsed);
        event.message = message;
        self.submit_event(event);
    }

    /// Fold an event into its window, then check it against the thresholds
    pub fn submit_event(&self, event: TimingEvent) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(tag = %event.tag, "collector shut down, event dropped");
            return;
        }

        let recorded = self.registry.record(&event);

        let thresholds = self.thresholds.load();
        if thresholds.is_empty() {
            return;
        }

        let now = self.clock.now_ms();
        let snapshot = match &recorded {
            Some((_, accumulator)) if thresholds.needs_snapshot(&event.tag) => {
                Some(accumulator.snapshot(now))
            }
            _ => None,
        };

        for breach in thresholds.evaluate(&event, snapshot.as_ref()) {
            let notification = Notification::out_of_range(
                self.registry.identity(),
                self.emitter.next_sequence(),
                &event.tag,
                breach.statistic,
                breach.observed,
                breach.range,
                now,
            );
            tracing::debug!(
                tag = %event.tag,
                statistic = %breach.statistic,
                observed = breach.observed,
                "threshold breached"
            );
            self.emitter.emit(notification);
        }
    }

    pub fn management(&self) -> ManagementInterface {
        ManagementInterface::new(
            self.registry.clone(),
            self.emitter.clone(),
            self.clock.clone(),
        )
    }

    pub fn subscribe<L: NotificationListener>(&self, listener: L) -> SubscriptionId {
        self.emitter.subscribe(listener)
    }

    /// Subscribe through a bounded channel
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<Notification>) {
        self.emitter.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.emitter.unsubscribe(id)
    }

    /// Swap in a new threshold expression; the old rules stay on failure
    pub fn set_thresholds(&self, expr: &str) -> Result<()> {
        let evaluator = ThresholdEvaluator::parse(expr)?;
        self.thresholds.store(Arc::new(evaluator));
        tracing::info!(identity = %self.registry.identity(), thresholds = expr, "thresholds updated");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Unregister the exposed set and drain every subscriber
    ///
    /// Idempotent; later submissions are dropped.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.deactivate();
        self.emitter.shutdown();
        tracing::info!(identity = %self.registry.identity(), "collector shut down");
    }
}

impl TimingSink for Collector {
    fn record(&self, event: TimingEvent) {
        self.submit_event(event);
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("registry", &self.registry)
            .field("emitter", &self.emitter)
            .field("closed", &self.is_shut_down())
            .finish()
    }
}
