//! Time-sliced windows of per-tag accumulators
//!
//! Time is cut into fixed-length slices, `slice_id = start_ms / slice_length`.
//! Exactly one slice is active. When an event lands in a later slice the
//! manager swaps a fresh slice in and keeps the old one as the retired slice
//! until the next rotation.
//!
//! ```text
//!   event(t) ──► slice_id(t) == active.id ? ──yes──► active
//!                       │ no (later slice)
//!                       ▼
//!        rotation lock ─► active := new slice, retired := old active
//! ```
//!
//! Readers load the active pointer once and work on that slice, so a reader
//! racing a rotation sees either the whole old slice or the whole new one.
//! Rotation only happens on ingestion; an idle collector keeps reporting the
//! last active slice even after its end time has passed.

use crate::accumulator::{StatsSnapshot, TagAccumulator};
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// One window of accumulators
#[derive(Debug)]
pub struct TimeSlice {
    id: u64,
    start_ms: u64,
    length_ms: u64,
    /// The slice built at startup, before any event chose a window
    provisional: bool,
    accumulators: RwLock<HashMap<String, Arc<TagAccumulator>>>,
}

impl TimeSlice {
    fn new<I>(id: u64, length_ms: u64, provisional: bool, tags: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let start_ms = id.saturating_mul(length_ms);
        let accumulators = tags
            .into_iter()
            .map(|tag| (tag, Arc::new(TagAccumulator::new(start_ms, length_ms))))
            .collect();

        Self {
            id,
            start_ms,
            length_ms,
            provisional,
            accumulators: RwLock::new(accumulators),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.length_ms)
    }

    pub fn length_ms(&self) -> u64 {
        self.length_ms
    }

    pub fn accumulator(&self, tag: &str) -> Option<Arc<TagAccumulator>> {
        self.accumulators.read().get(tag).cloned()
    }

    /// Look the tag up under the read lock, inserting under the write lock
    /// only on first use in this slice
    pub fn accumulator_or_insert(&self, tag: &str) -> Arc<TagAccumulator> {
        if let Some(acc) = self.accumulator(tag) {
            return acc;
        }
        let mut map = self.accumulators.write();
        map.entry(tag.to_string())
            .or_insert_with(|| Arc::new(TagAccumulator::new(self.start_ms, self.length_ms)))
            .clone()
    }

    pub fn remove(&self, tag: &str) -> bool {
        self.accumulators.write().remove(tag).is_some()
    }

    pub fn tags(&self) -> Vec<String> {
        self.accumulators.read().keys().cloned().collect()
    }

    /// Statistics for `tag`; a tag with no accumulator reads as an empty window
    pub fn snapshot(&self, tag: &str, now_ms: u64) -> StatsSnapshot {
        match self.accumulator(tag) {
            Some(acc) => acc.snapshot(now_ms),
            None => StatsSnapshot::empty(self.start_ms, self.end_ms()),
        }
    }
}

/// Owns the active and retired slices and decides when to rotate
#[derive(Debug)]
pub struct TimeSliceManager {
    slice_length_ms: u64,
    active: ArcSwap<TimeSlice>,
    retired: ArcSwapOption<TimeSlice>,
    rotation: Mutex<()>,
}

impl TimeSliceManager {
    /// Start with a provisional slice covering `now_ms`
    ///
    /// # Panics
    ///
    /// Panics if `slice_length_ms` is 0.
    pub fn new(slice_length_ms: u64, now_ms: u64) -> Self {
        assert!(slice_length_ms > 0, "slice length must be > 0");

        let initial = TimeSlice::new(now_ms / slice_length_ms, slice_length_ms, true, Vec::new());
        Self {
            slice_length_ms,
            active: ArcSwap::from_pointee(initial),
            retired: ArcSwapOption::empty(),
            rotation: Mutex::new(()),
        }
    }

    pub fn slice_length_ms(&self) -> u64 {
        self.slice_length_ms
    }

    pub fn slice_id(&self, time_ms: u64) -> u64 {
        time_ms / self.slice_length_ms
    }

    pub fn active(&self) -> Arc<TimeSlice> {
        self.active.load_full()
    }

    pub fn retired(&self) -> Option<Arc<TimeSlice>> {
        self.retired.load_full()
    }

    /// The slice an event starting at `event_ms` should be counted in
    ///
    /// Events for a later slice rotate. Events for an earlier slice than the
    /// active one are late and count toward the active slice, except that the
    /// provisional startup slice yields to whatever window the first events
    /// name. `seed` lists the tags the new slice starts with.
    pub fn slice_for<F>(&self, event_ms: u64, seed: F) -> Arc<TimeSlice>
    where
        F: FnOnce() -> Vec<String>,
    {
        let id = self.slice_id(event_ms);
        let active = self.active.load_full();
        if !Self::needs_rotation(&active, id) {
            return active;
        }

        let _guard = self.rotation.lock();
        let active = self.active.load_full();
        if !Self::needs_rotation(&active, id) {
            return active;
        }

        let next = Arc::new(TimeSlice::new(id, self.slice_length_ms, false, seed()));
        let previous = self.active.swap(next.clone());
        tracing::debug!(
            from = previous.id,
            to = id,
            "rotated time slice"
        );
        self.retired.store(Some(previous));
        next
    }

    fn needs_rotation(active: &TimeSlice, id: u64) -> bool {
        id > active.id || (active.provisional && id != active.id)
    }
}
