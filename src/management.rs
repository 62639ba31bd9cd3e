//! Read and administer the exposed statistics
//!
//! Every exposed tag contributes six read-only attributes named
//! `<tag><Statistic>`:
//!
//! | Attribute      | Kind    | Unit       |
//! |----------------|---------|------------|
//! | `<tag>Count`   | integer | events     |
//! | `<tag>Mean`    | float   | ms         |
//! | `<tag>StdDev`  | float   | ms         |
//! | `<tag>Min`     | integer | ms         |
//! | `<tag>Max`     | integer | ms         |
//! | `<tag>TPS`     | float   | events/sec |
//!
//! Values come from the active window at the moment of the call and each
//! attribute is read on its own. Administrative calls go straight to the
//! registry and keep its contract.

use crate::accumulator::StatsSnapshot;
use crate::clock::Clock;
use crate::error::{ConfigurationError, ManagementError};
use crate::notification::{NotificationEmitter, NotificationListener, SubscriberStats, SubscriptionId};
use crate::registry::{AttributeRegistry, CollisionPolicy};
use crate::threshold::Statistic;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Value of a single attribute
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(u64),
    Float(f64),
}

impl AttributeValue {
    pub fn as_f64(self) -> f64 {
        match self {
            AttributeValue::Integer(v) => v as f64,
            AttributeValue::Float(v) => v,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{:.3}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Integer,
    Float,
}

/// Name, kind and description of one exposed attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeInfo {
    pub name: String,
    pub kind: AttributeKind,
    pub description: String,
}

/// Statistics of one exposed tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagStatistics {
    pub tag: String,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

/// Bounds of the active window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowBounds {
    pub start_ms: u64,
    pub end_ms: u64,
}

fn kind_of(statistic: Statistic) -> AttributeKind {
    match statistic {
        Statistic::Count | Statistic::Min | Statistic::Max => AttributeKind::Integer,
        _ => AttributeKind::Float,
    }
}

fn describe(tag: &str, statistic: Statistic) -> String {
    match statistic {
        Statistic::Count => format!("Number of {} events in the current window", tag),
        Statistic::Mean => format!("Mean elapsed time of {} in ms", tag),
        Statistic::StdDev => format!("Standard deviation of {} elapsed time in ms", tag),
        Statistic::Min => format!("Minimum elapsed time of {} in ms", tag),
        Statistic::Max => format!("Maximum elapsed time of {} in ms", tag),
        Statistic::Tps => format!("{} events per second", tag),
        Statistic::Elapsed => format!("Elapsed time of a single {} event in ms", tag),
    }
}

fn value_of(statistic: Statistic, snapshot: &StatsSnapshot) -> AttributeValue {
    match statistic {
        Statistic::Count => AttributeValue::Integer(snapshot.count),
        Statistic::Min => AttributeValue::Integer(snapshot.min),
        Statistic::Max => AttributeValue::Integer(snapshot.max),
        Statistic::Mean => AttributeValue::Float(snapshot.mean),
        Statistic::StdDev => AttributeValue::Float(snapshot.stddev),
        Statistic::Tps => AttributeValue::Float(snapshot.tps),
        Statistic::Elapsed => AttributeValue::Float(0.0),
    }
}

/// Handle for reading attributes and administering the exposed set
///
/// Cheap to clone; all clones talk to the same collector.
#[derive(Clone)]
pub struct ManagementInterface {
    registry: Arc<AttributeRegistry>,
    emitter: Arc<NotificationEmitter>,
    clock: Arc<dyn Clock>,
}

impl ManagementInterface {
    pub(crate) fn new(
        registry: Arc<AttributeRegistry>,
        emitter: Arc<NotificationEmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            emitter,
            clock,
        }
    }

    pub fn identity(&self) -> &str {
        self.registry.identity()
    }

    /// Read one attribute, e.g. `tag0Count`
    pub fn get_attribute(&self, name: &str) -> Result<AttributeValue, ManagementError> {
        let not_found = || ManagementError::AttributeNotFound(name.to_string());
        let (tag, statistic) = Statistic::split_attribute(name).ok_or_else(not_found)?;
        let snapshot = self
            .registry
            .snapshot(tag, self.clock.now_ms())
            .ok_or_else(not_found)?;
        Ok(value_of(statistic, &snapshot))
    }

    /// Read several attributes; each is read independently
    pub fn get_attributes<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Vec<(String, Result<AttributeValue, ManagementError>)> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), self.get_attribute(name))
            })
            .collect()
    }

    /// Every visible attribute, six per exposed tag
    pub fn attribute_info(&self) -> Vec<AttributeInfo> {
        self.registry
            .exposed_tags()
            .iter()
            .flat_map(|tag| {
                Statistic::EXPOSED.iter().map(move |&stat| AttributeInfo {
                    name: format!("{}{}", tag, stat.suffix()),
                    kind: kind_of(stat),
                    description: describe(tag, stat),
                })
            })
            .collect()
    }

    pub fn attribute_count(&self) -> usize {
        self.registry.attribute_count()
    }

    pub fn exposed_tags(&self) -> Vec<String> {
        self.registry.exposed_tags()
    }

    pub fn is_registered(&self) -> bool {
        self.registry.is_registered()
    }

    /// Active-window statistics of every exposed tag, in exposure order
    pub fn snapshot(&self) -> Vec<TagStatistics> {
        let now = self.clock.now_ms();
        let active = self.registry.slices().active();
        self.registry
            .exposed_tags()
            .into_iter()
            .map(|tag| {
                let stats = active.snapshot(&tag, now);
                TagStatistics { tag, stats }
            })
            .collect()
    }

    /// Statistics of the most recently retired window, if a rotation happened
    pub fn retired_snapshot(&self) -> Option<Vec<TagStatistics>> {
        let retired = self.registry.slices().retired()?;
        let end = retired.end_ms();
        Some(
            self.registry
                .exposed_tags()
                .into_iter()
                .map(|tag| {
                    let stats = retired.snapshot(&tag, end);
                    TagStatistics { tag, stats }
                })
                .collect(),
        )
    }

    pub fn window(&self) -> WindowBounds {
        let active = self.registry.slices().active();
        WindowBounds {
            start_ms: active.start_ms(),
            end_ms: active.end_ms(),
        }
    }

    pub fn expose_tag(&self, name: &str) -> Result<(), ManagementError> {
        Ok(self.registry.expose_tag(name)?)
    }

    pub fn remove_tag(&self, name: &str) -> bool {
        self.registry.remove_tag(name)
    }

    pub fn activate<I, S>(&self, tags: I, policy: CollisionPolicy) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.activate(tags, policy)
    }

    pub fn deactivate(&self) -> bool {
        self.registry.deactivate()
    }

    pub fn subscribe<L: NotificationListener>(&self, listener: L) -> SubscriptionId {
        self.emitter.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.emitter.unsubscribe(id)
    }

    /// Delivery counters per subscriber
    pub fn subscriber_stats(&self) -> Vec<SubscriberStats> {
        self.emitter.stats()
    }
}

impl fmt::Debug for ManagementInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementInterface")
            .field("identity", &self.registry.identity())
            .field("attributes", &self.attribute_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::TimingEvent;
    use crate::notification::OverflowPolicy;
    use crate::time_slice::TimeSliceManager;
    use std::time::Duration;

    fn fixture() -> (ManagementInterface, Arc<AttributeRegistry>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let registry = Arc::new(AttributeRegistry::new(
            "test",
            TimeSliceManager::new(1_000, 0),
            false,
        ));
        let emitter = Arc::new(NotificationEmitter::new(4, OverflowPolicy::DropOldest));
        let mgmt = ManagementInterface::new(registry.clone(), emitter, clock.clone());
        (mgmt, registry, clock)
    }

    #[test]
    fn test_exposed_tag_reads_zero() {
        let (mgmt, _, _) = fixture();
        mgmt.expose_tag("x").unwrap();
        assert_eq!(mgmt.get_attribute("xCount").unwrap(), AttributeValue::Integer(0));
        assert_eq!(mgmt.get_attribute("xMean").unwrap(), AttributeValue::Float(0.0));
        assert_eq!(mgmt.get_attribute("xTPS").unwrap(), AttributeValue::Float(0.0));
    }

    #[test]
    fn test_unknown_attributes() {
        let (mgmt, _, _) = fixture();
        mgmt.expose_tag("x").unwrap();
        for name in ["yCount", "x", "xMedian", "Count"] {
            assert_eq!(
                mgmt.get_attribute(name),
                Err(ManagementError::AttributeNotFound(name.to_string()))
            );
        }
    }

    #[test]
    fn test_attribute_values() {
        let (mgmt, registry, clock) = fixture();
        mgmt.activate(["db"], CollisionPolicy::Error).unwrap();
        for ms in [10, 20, 30] {
            registry.record(&TimingEvent::new("db", 100, Duration::from_millis(ms)));
        }
        clock.set(500);

        assert_eq!(mgmt.get_attribute("dbCount").unwrap(), AttributeValue::Integer(3));
        assert_eq!(mgmt.get_attribute("dbMin").unwrap(), AttributeValue::Integer(10));
        assert_eq!(mgmt.get_attribute("dbMax").unwrap(), AttributeValue::Integer(30));
        assert_eq!(mgmt.get_attribute("dbMean").unwrap(), AttributeValue::Float(20.0));
        // 3 events over half a second
        assert_eq!(mgmt.get_attribute("dbTPS").unwrap().as_f64(), 6.0);
        let stddev = mgmt.get_attribute("dbStdDev").unwrap().as_f64();
        assert!((stddev - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_get_attributes_reads_each_independently() {
        let (mgmt, _, _) = fixture();
        mgmt.expose_tag("x").unwrap();
        let values = mgmt.get_attributes(&["xCount", "nope"]);
        assert_eq!(values.len(), 2);
        assert!(values[0].1.is_ok());
        assert!(values[1].1.is_err());
    }

    #[test]
    fn test_attribute_info_lists_six_per_tag() {
        let (mgmt, _, _) = fixture();
        mgmt.activate(["a", "b"], CollisionPolicy::Error).unwrap();
        let info = mgmt.attribute_info();
        assert_eq!(info.len(), 12);
        assert_eq!(mgmt.attribute_count(), 12);
        let names: Vec<_> = info.iter().take(6).map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["aCount", "aMean", "aStdDev", "aMin", "aMax", "aTPS"]);
        assert_eq!(info[0].kind, AttributeKind::Integer);
        assert_eq!(info[1].kind, AttributeKind::Float);
    }

    #[test]
    fn test_snapshot_in_exposure_order() {
        let (mgmt, _, _) = fixture();
        mgmt.activate(["b", "a"], CollisionPolicy::Error).unwrap();
        let tags: Vec<_> = mgmt.snapshot().into_iter().map(|s| s.tag).collect();
        assert_eq!(tags, vec!["b", "a"]);
        assert!(mgmt.retired_snapshot().is_none());
    }

    #[test]
    fn test_window_and_retired_snapshot() {
        let (mgmt, registry, _) = fixture();
        mgmt.activate(["a"], CollisionPolicy::Error).unwrap();
        registry.record(&TimingEvent::new("a", 100, Duration::from_millis(5)));
        registry.record(&TimingEvent::new("a", 3_100, Duration::from_millis(7)));

        assert_eq!(
            mgmt.window(),
            WindowBounds {
                start_ms: 3_000,
                end_ms: 4_000
            }
        );
        let retired = mgmt.retired_snapshot().unwrap();
        assert_eq!(retired[0].stats.count, 1);
        assert_eq!(retired[0].stats.max, 5);
    }

    #[test]
    fn test_remove_and_deactivate() {
        let (mgmt, _, _) = fixture();
        mgmt.expose_tag("x").unwrap();
        assert!(mgmt.remove_tag("x"));
        assert!(!mgmt.remove_tag("x"));
        assert!(mgmt.get_attribute("xCount").is_err());
        assert!(mgmt.is_registered());
        assert!(mgmt.deactivate());
        assert!(!mgmt.is_registered());
    }

    #[test]
    fn test_expose_invalid_tag_is_configuration_error() {
        let (mgmt, _, _) = fixture();
        assert!(matches!(
            mgmt.expose_tag("a(b"),
            Err(ManagementError::Configuration(ConfigurationError::InvalidTagName(_)))
        ));
    }

    #[test]
    fn test_serialized_snapshot_is_flat() {
        let (mgmt, _, _) = fixture();
        mgmt.expose_tag("x").unwrap();
        let json = serde_json::to_value(mgmt.snapshot()).unwrap();
        assert_eq!(json[0]["tag"], "x");
        assert_eq!(json[0]["count"], 0);
        assert_eq!(json[0]["window_end_ms"], 1_000);
    }
}
