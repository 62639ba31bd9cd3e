//! Integration tests for time-sliced windows
//!
//! # Test Coverage
//!
//! - ✅ Events more than one slice apart land in independent windows
//! - ✅ Retired window keeps the previous statistics
//! - ✅ Late events fold into the active window
//! - ✅ Readers racing a rotation see whole windows
//! - ✅ Rollup into parent tags

use cronometro::clock::ManualClock;
use cronometro::management::AttributeValue;
use cronometro::{Collector, CollectorConfig, StopWatch};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn collector(slice_ms: u64, tags: &[&str]) -> (Collector, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let config = CollectorConfig::default()
        .with_slice_length_ms(slice_ms)
        .with_tags(tags.iter().copied());
    (Collector::with_clock(config, clock.clone()).unwrap(), clock)
}

#[test]
fn test_events_in_separate_slices_are_independent() {
    let (collector, clock) = collector(1_000, &["t"]);
    let mgmt = collector.management();

    collector.submit("t", 100, Duration::from_millis(500), None);
    collector.submit("t", 5_100, Duration::from_millis(10), None);
    clock.set(5_500);

    assert_eq!(mgmt.get_attribute("tCount").unwrap(), AttributeValue::Integer(1));
    assert_eq!(mgmt.get_attribute("tMax").unwrap(), AttributeValue::Integer(10));

    let retired = mgmt.retired_snapshot().unwrap();
    assert_eq!(retired[0].stats.count, 1);
    assert_eq!(retired[0].stats.max, 500);
    assert_eq!(retired[0].stats.window_start_ms, 0);
}

#[test]
fn test_window_bounds_follow_events() {
    let (collector, _) = collector(30_000, &["t"]);
    let mgmt = collector.management();
    collector.submit("t", 65_000, Duration::from_millis(1), None);
    let window = mgmt.window();
    assert_eq!(window.start_ms, 60_000);
    assert_eq!(window.end_ms, 90_000);
}

#[test]
fn test_late_event_counts_in_active_window() {
    let (collector, _) = collector(1_000, &["t"]);
    let mgmt = collector.management();
    collector.submit("t", 10_100, Duration::from_millis(1), None);
    collector.submit("t", 9_900, Duration::from_millis(1), None);

    assert_eq!(mgmt.window().start_ms, 10_000);
    assert_eq!(mgmt.get_attribute("tCount").unwrap(), AttributeValue::Integer(2));
}

#[test]
fn test_idle_collector_reports_stale_window() {
    let (collector, clock) = collector(1_000, &["t"]);
    collector.submit("t", 100, Duration::from_millis(7), None);
    // No events for a long time: no timer rotates the window
    clock.set(60_000);
    let mgmt = collector.management();
    assert_eq!(mgmt.get_attribute("tCount").unwrap(), AttributeValue::Integer(1));
    assert_eq!(mgmt.window().end_ms, 1_000);
    assert_eq!(mgmt.get_attribute("tTPS").unwrap(), AttributeValue::Float(1.0));
}

#[test]
fn test_readers_never_see_partial_windows() {
    // Every window receives exactly 100 identical events; a reader must see
    // either a whole window's statistics or a consistent prefix of one
    let (collector, _) = collector(1_000, &["t"]);
    let collector = Arc::new(collector);
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let mgmt = collector.management();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                for stats in mgmt.snapshot() {
                    assert!(stats.stats.count <= 100);
                    if stats.stats.count > 0 {
                        assert_eq!(stats.stats.min, stats.stats.max);
                        assert_eq!(stats.stats.stddev, 0.0);
                    }
                }
            }
        })
    };

    for window in 0..50u64 {
        let elapsed = Duration::from_millis(window + 1);
        for _ in 0..100 {
            collector.submit("t", window * 1_000 + 10, elapsed, None);
        }
    }
    done.store(true, Ordering::Release);
    reader.join().unwrap();

    let retired = collector.management().retired_snapshot().unwrap();
    assert_eq!(retired[0].stats.count, 100);
    assert_eq!(retired[0].stats.max, 49);
}

#[test]
fn test_rollup_statistics() {
    let clock = Arc::new(ManualClock::new(0));
    let config = CollectorConfig::default()
        .with_tags(["http", "http.get", "http.post"])
        .with_rollup(true);
    let collector = Collector::with_clock(config, clock).unwrap();
    let mgmt = collector.management();

    collector.submit("http.get", 0, Duration::from_millis(10), None);
    collector.submit("http.get", 0, Duration::from_millis(20), None);
    collector.submit("http.post", 0, Duration::from_millis(30), None);

    assert_eq!(mgmt.get_attribute("httpCount").unwrap(), AttributeValue::Integer(3));
    assert_eq!(mgmt.get_attribute("httpMean").unwrap(), AttributeValue::Float(20.0));
    assert_eq!(mgmt.get_attribute("http.getCount").unwrap(), AttributeValue::Integer(2));
}

#[test]
fn test_rollup_disabled_by_default() {
    let (collector, _) = collector(1_000, &["http", "http.get"]);
    collector.submit("http.get", 0, Duration::from_millis(10), None);
    assert_eq!(
        collector.management().get_attribute("httpCount").unwrap(),
        AttributeValue::Integer(0)
    );
}

#[test]
fn test_stopwatch_into_collector() {
    let config = CollectorConfig::default()
        .with_tags(["sw"])
        .with_slice_length_ms(86_400_000);
    let collector = Collector::new(config).unwrap();
    let mut watch = StopWatch::start("sw");
    watch.lap(&collector, "sw");
    watch.stop(&collector);
    let count = collector.management().get_attribute("swCount").unwrap();
    assert_eq!(count, AttributeValue::Integer(2));
}
