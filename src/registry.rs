//! The live set of exposed tags and the accumulators behind them
//!
//! The exposed set is versioned: every administrative change builds a new
//! immutable [`ExposedSet`] and swaps it in atomically. Ingestion and readers
//! load whichever version is current and never wait on an administrator.
//! Administrative changes are serialized among themselves.
//!
//! Whole-set registration goes through [`AttributeRegistry::activate`], whose
//! [`CollisionPolicy`] decides what happens when a set is already registered:
//! fail, replace the whole set, or leave it alone. Sets are never merged.

use crate::accumulator::{StatsSnapshot, TagAccumulator};
use crate::error::{ConfigurationError, Result};
use crate::event::TimingEvent;
use crate::threshold::Statistic;
use crate::time_slice::{TimeSlice, TimeSliceManager};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What `activate` does when a set is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Refuse with a configuration error; the registered set stays
    #[default]
    Error,
    /// Tear the registered set down and register the new one
    Replace,
    /// Keep the registered set and drop the request silently
    Ignore,
}

impl FromStr for CollisionPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(CollisionPolicy::Error),
            "replace" => Ok(CollisionPolicy::Replace),
            "ignore" => Ok(CollisionPolicy::Ignore),
            _ => Err(ConfigurationError::UnknownCollisionPolicy(s.to_string())),
        }
    }
}

/// One immutable version of the exposed tag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedSet {
    version: u64,
    tags: Vec<String>,
    index: HashSet<String>,
}

impl ExposedSet {
    fn new(version: u64, tags: Vec<String>) -> Self {
        let index = tags.iter().cloned().collect();
        Self {
            version,
            tags,
            index,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Tags in exposure order
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.index.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Six attributes per exposed tag
    pub fn attribute_count(&self) -> usize {
        self.tags.len() * Statistic::EXPOSED.len()
    }
}

/// Tag names end up inside attribute names and threshold expressions
pub fn validate_tag(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(['(', ')', ',']) {
        return Err(ConfigurationError::InvalidTagName(name.to_string()));
    }
    Ok(())
}

/// Parent tags of a dotted tag, nearest first: `a.b.c` → `a.b`, `a`
pub fn rollup_parents(tag: &str) -> impl Iterator<Item = &str> {
    tag.rmatch_indices('.')
        .map(move |(i, _)| &tag[..i])
        .filter(|parent| !parent.is_empty())
}

/// Exposed tag set plus the time-sliced accumulators it routes events to
#[derive(Debug)]
pub struct AttributeRegistry {
    identity: String,
    current: ArcSwapOption<ExposedSet>,
    admin: Mutex<()>,
    versions: AtomicU64,
    slices: TimeSliceManager,
    rollup: bool,
}

impl AttributeRegistry {
    pub fn new(identity: impl Into<String>, slices: TimeSliceManager, rollup: bool) -> Self {
        Self {
            identity: identity.into(),
            current: ArcSwapOption::empty(),
            admin: Mutex::new(()),
            versions: AtomicU64::new(1),
            slices,
            rollup,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn slices(&self) -> &TimeSliceManager {
        &self.slices
    }

    pub fn is_registered(&self) -> bool {
        self.current.load().is_some()
    }

    /// The current version, if a set is registered
    pub fn exposed(&self) -> Option<Arc<ExposedSet>> {
        self.current.load_full()
    }

    pub fn exposed_tags(&self) -> Vec<String> {
        self.exposed()
            .map(|set| set.tags().to_vec())
            .unwrap_or_default()
    }

    pub fn is_exposed(&self, tag: &str) -> bool {
        self.exposed().is_some_and(|set| set.contains(tag))
    }

    pub fn attribute_count(&self) -> usize {
        self.exposed().map_or(0, |set| set.attribute_count())
    }

    fn publish(&self, tags: Vec<String>) -> Arc<ExposedSet> {
        let version = self.versions.fetch_add(1, Ordering::Relaxed);
        let set = Arc::new(ExposedSet::new(version, tags));
        self.current.store(Some(set.clone()));
        set
    }

    /// Make `name` visible; registers a one-tag set if nothing is registered
    pub fn expose_tag(&self, name: &str) -> Result<()> {
        validate_tag(name)?;
        let _admin = self.admin.lock();

        let mut tags = self.exposed_tags();
        if !tags.iter().any(|t| t == name) {
            tags.push(name.to_string());
            let set = self.publish(tags);
            tracing::info!(
                identity = %self.identity,
                tag = name,
                version = set.version(),
                "exposed tag"
            );
        }
        self.slices.active().accumulator_or_insert(name);
        Ok(())
    }

    /// Hide `name`; returns whether it was exposed
    pub fn remove_tag(&self, name: &str) -> bool {
        let _admin = self.admin.lock();

        let Some(current) = self.exposed() else {
            return false;
        };
        if !current.contains(name) {
            return false;
        }

        let tags = current
            .tags()
            .iter()
            .filter(|t| t.as_str() != name)
            .cloned()
            .collect();
        let set = self.publish(tags);
        self.discard(name);
        tracing::info!(
            identity = %self.identity,
            tag = name,
            version = set.version(),
            "removed tag"
        );
        true
    }

    /// Register a whole tag set under this registry's identity
    pub fn activate<I, S>(&self, tags: I, policy: CollisionPolicy) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.as_ref();
            validate_tag(tag)?;
            if !ordered.iter().any(|t| t == tag) {
                ordered.push(tag.to_string());
            }
        }

        let _admin = self.admin.lock();
        if let Some(previous) = self.exposed() {
            match policy {
                CollisionPolicy::Error => {
                    tracing::warn!(
                        identity = %self.identity,
                        "activation refused: a tag set is already registered"
                    );
                    return Err(ConfigurationError::Collision {
                        identity: self.identity.clone(),
                    });
                }
                CollisionPolicy::Ignore => {
                    tracing::debug!(
                        identity = %self.identity,
                        "activation ignored: a tag set is already registered"
                    );
                    return Ok(());
                }
                CollisionPolicy::Replace => {
                    self.tear_down(&previous);
                }
            }
        }

        let set = self.publish(ordered);
        let active = self.slices.active();
        for tag in set.tags() {
            active.accumulator_or_insert(tag);
        }
        tracing::info!(
            identity = %self.identity,
            tags = set.len(),
            version = set.version(),
            "activated exposed tag set"
        );
        Ok(())
    }

    /// Unregister the current set; returns whether one was registered
    pub fn deactivate(&self) -> bool {
        let _admin = self.admin.lock();
        match self.current.swap(None) {
            Some(previous) => {
                self.tear_down(&previous);
                tracing::info!(identity = %self.identity, "deactivated exposed tag set");
                true
            }
            None => false,
        }
    }

    fn tear_down(&self, previous: &ExposedSet) {
        for tag in previous.tags() {
            self.discard(tag);
        }
    }

    /// Drop `tag`'s accumulators from both the active and the retired window
    fn discard(&self, tag: &str) {
        self.slices.active().remove(tag);
        if let Some(retired) = self.slices.retired() {
            retired.remove(tag);
        }
    }

    /// Route one event into the active window
    ///
    /// Updates the event's own tag and, with rollups enabled, each exposed
    /// parent tag. Returns the accumulator for the event's own tag when that
    /// tag is exposed.
    pub fn record(&self, event: &TimingEvent) -> Option<(Arc<TimeSlice>, Arc<TagAccumulator>)> {
        let set = self.exposed()?;
        self.record_in(&set, event)
    }

    fn record_in(
        &self,
        set: &ExposedSet,
        event: &TimingEvent,
    ) -> Option<(Arc<TimeSlice>, Arc<TagAccumulator>)> {
        let slice = self
            .slices
            .slice_for(event.start_ms, || set.tags().to_vec());

        if self.rollup {
            for parent in rollup_parents(&event.tag).filter(|p| set.contains(p)) {
                slice.accumulator_or_insert(parent).update(event.elapsed);
            }
        }

        let accumulator = set.contains(&event.tag).then(|| {
            let accumulator = slice.accumulator_or_insert(&event.tag);
            accumulator.update(event.elapsed);
            accumulator
        });

        if self.exposed().map(|current| current.version()) != Some(set.version())
            && self.drop_orphans(&slice, set, &event.tag)
        {
            return None;
        }
        accumulator.map(|accumulator| (slice, accumulator))
    }

    /// Undo inserts made against a set that was swapped out mid-record
    ///
    /// Returns whether `tag` itself is no longer exposed.
    fn drop_orphans(&self, slice: &TimeSlice, stale: &ExposedSet, tag: &str) -> bool {
        let _admin = self.admin.lock();
        let current = self.exposed();
        let exposed = |t: &str| current.as_ref().is_some_and(|set| set.contains(t));

        if self.rollup {
            for parent in rollup_parents(tag).filter(|p| stale.contains(p) && !exposed(*p)) {
                slice.remove(parent);
            }
        }
        if exposed(tag) {
            return false;
        }
        if !stale.contains(tag) {
            return true;
        }
        slice.remove(tag);
        tracing::debug!(
            identity = %self.identity,
            tag,
            "dropped accumulator for a tag removed while recording"
        );
        true
    }

    /// Active-window statistics for an exposed tag
    pub fn snapshot(&self, tag: &str, now_ms: u64) -> Option<StatsSnapshot> {
        if !self.is_exposed(tag) {
            return None;
        }
        Some(self.slices.active().snapshot(tag, now_ms))
    }

    /// Statistics for an exposed tag in the most recently retired window
    pub fn retired_snapshot(&self, tag: &str) -> Option<StatsSnapshot> {
        if !self.is_exposed(tag) {
            return None;
        }
        let retired = self.slices.retired()?;
        Some(retired.snapshot(tag, retired.end_ms()))
    }
}
