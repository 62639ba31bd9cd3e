//! Property-based tests for the statistics engine
//!
//! Invariants covered:
//! 1. `min ≤ mean ≤ max` once a window has events
//! 2. Identical durations give zero stddev and `mean = min = max`
//! 3. Nothing is lost under concurrent same-tag updates
//! 4. Activating N distinct tags exposes N × 6 attributes
//! 5. Stopwatch lines survive a render/parse cycle
//! 6. Threshold parsing never panics

use cronometro::accumulator::{RunningStats, TagAccumulator};
use cronometro::registry::CollisionPolicy;
use cronometro::threshold::{AcceptableRange, ThresholdEvaluator};
use cronometro::{Collector, CollectorConfig, TimingEvent};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_mean_between_min_and_max(samples in prop::collection::vec(0u64..10_000_000, 1..200)) {
        let acc = TagAccumulator::new(0, 1_000);
        for us in &samples {
            acc.update(Duration::from_micros(*us));
        }
        let snap = acc.snapshot(1_000);
        prop_assert!(snap.min as f64 <= snap.mean);
        prop_assert!(snap.mean <= snap.max as f64);
        prop_assert!(snap.stddev >= 0.0);
        prop_assert_eq!(snap.count, samples.len() as u64);
    }

    #[test]
    fn prop_identical_sub_ms_samples_agree(us in 0u64..10_000_000, n in 1usize..100) {
        let acc = TagAccumulator::new(0, 1_000);
        for _ in 0..n {
            acc.update(Duration::from_micros(us));
        }
        let snap = acc.snapshot(1_000);
        prop_assert_eq!(snap.min, snap.max);
        prop_assert_eq!(snap.mean, snap.min as f64);
        prop_assert_eq!(snap.stddev, 0.0);
    }

    #[test]
    fn prop_identical_samples_have_zero_stddev(ms in 0u64..1_000_000, n in 1usize..500) {
        let acc = TagAccumulator::new(0, 1_000);
        for _ in 0..n {
            acc.update(Duration::from_millis(ms));
        }
        let snap = acc.snapshot(1_000);
        prop_assert_eq!(snap.stddev, 0.0);
        prop_assert_eq!(snap.mean, ms as f64);
        prop_assert_eq!(snap.min, ms);
        prop_assert_eq!(snap.max, ms);
    }

    #[test]
    fn prop_stddev_matches_two_pass(samples in prop::collection::vec(0u64..100_000, 2..100)) {
        let mut stats = RunningStats::new();
        for ms in &samples {
            stats.push(Duration::from_millis(*ms));
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<u64>() as f64 / n;
        let var = samples.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        prop_assert!((stats.stddev_ms() - var.sqrt()).abs() < 1e-6 * (1.0 + var.sqrt()));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_activation_exposes_six_per_tag(tags in prop::collection::vec("[a-z][a-z0-9.]{0,12}", 1..20)) {
        let distinct: HashSet<&String> = tags.iter().collect();
        let collector = Collector::new(CollectorConfig::default()).unwrap();
        let mgmt = collector.management();
        mgmt.activate(&tags, CollisionPolicy::Error).unwrap();
        prop_assert_eq!(mgmt.attribute_count(), distinct.len() * 6);
    }

    #[test]
    fn prop_stopwatch_line_roundtrip(
        tag in "[A-Za-z0-9_.-]{1,30}",
        start in 0u64..4_000_000_000_000,
        elapsed in 0u64..10_000_000,
        message in proptest::option::of("[a-z ]{0,30}"),
    ) {
        let mut event = TimingEvent::new(tag, start, Duration::from_millis(elapsed));
        event.message = message;
        let line = format!("INFO perf4j - {}", event);
        let parsed = TimingEvent::parse_line(&line).unwrap();
        prop_assert_eq!(parsed, event);
    }

    #[test]
    fn prop_threshold_parser_never_panics(expr in ".{0,40}") {
        let _ = ThresholdEvaluator::parse(&expr);
    }

    #[test]
    fn prop_between_range_inclusive(low in 0.0f64..1e6, width in 0.0f64..1e6) {
        let high = low + width;
        let range = AcceptableRange::Between(low, high);
        prop_assert!(range.contains(low));
        prop_assert!(range.contains(high));
        prop_assert!(!range.contains(high + 1.0));
    }
}

#[test]
fn test_concurrent_same_tag_updates_lose_nothing() {
    let acc = Arc::new(TagAccumulator::new(0, 1_000));
    let handles: Vec<_> = (1..=8u64)
        .map(|t| {
            let acc = acc.clone();
            thread::spawn(move || {
                for _ in 0..5_000 {
                    acc.update(Duration::from_millis(t));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let snap = acc.snapshot(1_000);
    assert_eq!(snap.count, 40_000);
    assert_eq!(snap.min, 1);
    assert_eq!(snap.max, 8);
    assert!((snap.mean - 4.5).abs() < 1e-9);
}
