//! Out-of-range notifications and their delivery
//!
//! Ingestion hands notifications to the [`NotificationEmitter`], which only
//! enqueues them. Every subscriber owns a bounded lock-free queue and a
//! delivery thread, so a slow or panicking listener never stalls ingestion
//! or the other subscribers.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ INGESTING THREADS (hot path) │  emit() → push into each subscriber queue
//! └──────────────────────────────┘
//!            │ ArrayQueue (bounded, per subscriber)
//!            ▼
//! ┌──────────────────────────────┐
//! │ DELIVERY THREAD (one each)   │  pop → listener.handle_notification()
//! └──────────────────────────────┘
//! ```
//!
//! When a queue is full the configured [`OverflowPolicy`] decides whether the
//! oldest queued notification or the new one is dropped. Each queue is FIFO,
//! so a subscriber sees notifications for any one tag in the order they were
//! raised.

use crate::threshold::{AcceptableRange, Statistic};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Notification type for a statistic outside its acceptable range
pub const OUT_OF_RANGE_NOTIFICATION_TYPE: &str = "OUT_OF_RANGE";

/// How long an idle delivery thread parks before re-checking its queue
const IDLE_PARK_MS: u64 = 50;

/// One threshold breach, as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Always [`OUT_OF_RANGE_NOTIFICATION_TYPE`]
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Identity of the exposed attribute set that raised it
    pub source: String,
    /// Emitter-wide sequence number
    pub sequence: u64,
    pub tag: String,
    pub statistic: Statistic,
    pub observed_value: f64,
    pub acceptable_range: AcceptableRange,
    /// When the breach was detected (ms since the Unix epoch)
    pub timestamp_ms: u64,
    pub message: String,
}

impl Notification {
    pub fn out_of_range(
        source: &str,
        sequence: u64,
        tag: &str,
        statistic: Statistic,
        observed_value: f64,
        acceptable_range: AcceptableRange,
        timestamp_ms: u64,
    ) -> Self {
        let attribute = format!("{}{}", tag, statistic.suffix());
        Self {
            notification_type: OUT_OF_RANGE_NOTIFICATION_TYPE.to_string(),
            source: source.to_string(),
            sequence,
            tag: tag.to_string(),
            statistic,
            observed_value,
            acceptable_range,
            timestamp_ms,
            message: format!(
                "Attribute value {} for {} ({}) not in range {}",
                observed_value, attribute, statistic, acceptable_range
            ),
        }
    }
}

/// Receives notifications on a subscriber's delivery thread
pub trait NotificationListener: Send + Sync + 'static {
    fn handle_notification(&self, notification: &Notification);
}

impl<F> NotificationListener for F
where
    F: Fn(&Notification) + Send + Sync + 'static,
{
    fn handle_notification(&self, notification: &Notification) {
        self(notification)
    }
}

/// Forwards notifications into a bounded crossbeam channel
pub struct ChannelListener {
    sender: Sender<Notification>,
}

impl ChannelListener {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Notification>) {
        let (sender, receiver) = channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl NotificationListener for ChannelListener {
    fn handle_notification(&self, notification: &Notification) {
        if self.sender.try_send(notification.clone()).is_err() {
            tracing::debug!(
                sequence = notification.sequence,
                "channel subscriber full or closed, notification discarded"
            );
        }
    }
}

/// What to drop when a subscriber's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued notification to make room
    #[default]
    DropOldest,
    /// Discard the notification being emitted
    DropNewest,
}

/// Handle returned by [`NotificationEmitter::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Delivery counters for one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    pub id: SubscriptionId,
    pub delivered: u64,
    pub dropped: u64,
    /// Listener invocations that panicked
    pub failed: u64,
    pub pending: usize,
    pub capacity: usize,
}

struct Subscriber {
    id: SubscriptionId,
    queue: Arc<ArrayQueue<Arc<Notification>>>,
    counters: Arc<Counters>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Subscriber {
    fn spawn(id: SubscriptionId, capacity: usize, listener: Arc<dyn NotificationListener>) -> Self {
        let queue = Arc::new(ArrayQueue::new(capacity));
        let counters = Arc::new(Counters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let queue = queue.clone();
            let counters = counters.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("cronometro-notify-{}", id.0))
                .spawn(move || Self::deliver(id, queue, counters, shutdown, listener))
                .ok()
        };
        if worker.is_none() {
            tracing::warn!(subscriber = id.0, "failed to spawn delivery thread");
        }

        Self {
            id,
            queue,
            counters,
            shutdown,
            worker,
        }
    }

    fn offer(&self, notification: Arc<Notification>, overflow: OverflowPolicy) {
        let dropped = match overflow {
            OverflowPolicy::DropOldest => self.queue.force_push(notification).is_some(),
            OverflowPolicy::DropNewest => self.queue.push(notification).is_err(),
        };
        if dropped {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                subscriber = self.id.0,
                "notification queue full - notification dropped ({:?})",
                overflow
            );
        }
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
    }

    /// Delivery loop; drains whatever is queued before exiting
    fn deliver(
        id: SubscriptionId,
        queue: Arc<ArrayQueue<Arc<Notification>>>,
        counters: Arc<Counters>,
        shutdown: Arc<AtomicBool>,
        listener: Arc<dyn NotificationListener>,
    ) {
        loop {
            let stopping = shutdown.load(Ordering::SeqCst);

            while let Some(notification) = queue.pop() {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    listener.handle_notification(&notification)
                }));
                match outcome {
                    Ok(()) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            subscriber = id.0,
                            sequence = notification.sequence,
                            "notification listener panicked"
                        );
                    }
                }
            }

            if stopping {
                break;
            }
            thread::park_timeout(Duration::from_millis(IDLE_PARK_MS));
        }
    }

    fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            id: self.id,
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            pending: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }

    /// Signal the delivery thread and wait for it to drain
    fn stop(self) {
        drop(self);
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            let _ = worker.join();
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Fans notifications out to subscribers without blocking the caller
pub struct NotificationEmitter {
    capacity: usize,
    overflow: OverflowPolicy,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl NotificationEmitter {
    /// Create an emitter whose subscribers each queue up to `capacity`
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        assert!(capacity > 0, "notification capacity must be > 0");
        Self {
            capacity,
            overflow,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Next notification sequence number
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe<L>(&self, listener: L) -> SubscriptionId
    where
        L: NotificationListener,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber::spawn(id, self.capacity, Arc::new(listener));
        self.subscribers.write().push(subscriber);
        tracing::debug!(subscriber = id.0, "notification subscriber added");
        id
    }

    /// Subscribe through a bounded channel instead of a callback
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<Notification>) {
        let (listener, receiver) = ChannelListener::bounded(self.capacity);
        (self.subscribe(listener), receiver)
    }

    /// Remove a subscriber after delivering what it already has queued
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.write();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| subscribers.remove(index))
        };
        match removed {
            Some(subscriber) => {
                subscriber.stop();
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Enqueue for every current subscriber; never blocks on delivery
    pub fn emit(&self, notification: Notification) {
        let notification = Arc::new(notification);
        for subscriber in self.subscribers.read().iter() {
            subscriber.offer(notification.clone(), self.overflow);
        }
    }

    pub fn stats(&self) -> Vec<SubscriberStats> {
        self.subscribers.read().iter().map(Subscriber::stats).collect()
    }

    /// Drain and stop every delivery thread
    pub fn shutdown(&self) {
        let subscribers = std::mem::take(&mut *self.subscribers.write());
        for subscriber in subscribers {
            subscriber.stop();
        }
    }
}

impl Drop for NotificationEmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for NotificationEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationEmitter")
            .field("capacity", &self.capacity)
            .field("overflow", &self.overflow)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
