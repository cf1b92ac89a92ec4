use std::sync::Arc;
use std::thread;
use stressrpc_harness::config::{HISTOGRAM_MAX_POSSIBLE, HISTOGRAM_RESOLUTION};
use stressrpc_harness::histogram::Histogram;

fn latency_histogram() -> Histogram {
    Histogram::new(HISTOGRAM_RESOLUTION, HISTOGRAM_MAX_POSSIBLE)
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    let error = (actual - expected).abs() / expected;
    assert!(error <= tolerance, "{actual} is not within {tolerance} of {expected}");
}

#[test]
fn test_empty_histogram_reports_zeros() {
    let h = latency_histogram();
    let s = h.snapshot();

    assert_eq!(s.count, 0);
    assert_eq!(s.mean(), 0.0);
    assert_eq!(s.stddev(), 0.0);
    assert_eq!(s.percentile(50.0), 0.0);
    assert!(s.buckets.iter().all(|&b| b == 0));
}

#[test]
fn test_mean_and_stddev() {
    let h = latency_histogram();
    for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
        h.record(v);
    }
    let s = h.snapshot();

    assert_eq!(s.count, 8);
    assert_eq!(s.sum, 40.0);
    assert_eq!(s.min, 2.0);
    assert_eq!(s.max, 9.0);
    assert_eq!(s.mean(), 5.0);
    assert_eq!(s.stddev(), 2.0);
}

#[test]
fn test_percentiles_within_bucket_resolution() {
    let h = latency_histogram();
    for i in 1..=1000u32 {
        h.record(f64::from(i) * 1_000.0);
    }
    let s = h.snapshot();

    // A bucket is 1% wide, so the interpolated value stays within one bucket of the truth.
    assert_close(s.percentile(50.0), 500_000.0, 0.02);
    assert_close(s.percentile(90.0), 900_000.0, 0.02);
    assert_close(s.percentile(99.0), 990_000.0, 0.02);

    // The extremes are clamped to what was actually observed.
    assert_eq!(s.percentile(0.0), 1_000.0);
    assert_eq!(s.percentile(100.0), 1_000_000.0);
}

#[test]
fn test_out_of_range_samples_are_clamped() {
    let h = latency_histogram();
    h.record(-5.0);
    h.record(f64::NAN);
    h.record(1e12);
    let s = h.snapshot();

    assert_eq!(s.count, 3);
    assert_eq!(s.min, 0.0);
    assert_eq!(s.max, HISTOGRAM_MAX_POSSIBLE);
    assert_eq!(s.buckets[0], 2);
    assert_eq!(*s.buckets.last().unwrap(), 1);
}

#[test]
fn test_snapshot_and_reset_hands_over_every_sample() {
    let h = latency_histogram();
    h.record(10.0);
    h.record(20.0);
    h.record(30.0);

    let first = h.snapshot_and_reset();
    assert_eq!(first.count, 3);
    assert_eq!(first.sum, 60.0);

    let second = h.snapshot();
    assert_eq!(second.count, 0);
    assert_eq!(second.sum, 0.0);
    assert!(second.buckets.iter().all(|&b| b == 0));
    assert_eq!(second.buckets.len(), first.buckets.len());

    h.record(5.0);
    assert_eq!(h.snapshot().count, 1);
    h.reset();
    assert_eq!(h.snapshot().count, 0);
}

#[test]
fn test_concurrent_records_are_not_lost() {
    let h = Arc::new(latency_histogram());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let h = h.clone();
            thread::spawn(move || {
                for i in 0..10_000u32 {
                    h.record(f64::from(t * 10_000 + i) + 1.0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let s = h.snapshot();
    assert_eq!(s.count, 80_000);
    assert_eq!(s.buckets.iter().sum::<u64>(), 80_000);
    assert_eq!(s.min, 1.0);
    assert_eq!(s.max, 80_000.0);
}

#[test]
fn test_merge_combines_compatible_snapshots() {
    let a = latency_histogram();
    let b = latency_histogram();
    a.record(100.0);
    a.record(200.0);
    b.record(50.0);
    b.record(400.0);

    let mut merged = a.snapshot();
    assert!(merged.merge(&b.snapshot()));
    assert_eq!(merged.count, 4);
    assert_eq!(merged.sum, 750.0);
    assert_eq!(merged.min, 50.0);
    assert_eq!(merged.max, 400.0);

    // Merging into an empty snapshot adopts the other's extremes.
    let mut empty = latency_histogram().snapshot();
    assert!(empty.merge(&b.snapshot()));
    assert_eq!(empty.min, 50.0);
    assert_eq!(empty.max, 400.0);

    let coarse = Histogram::new(0.5, HISTOGRAM_MAX_POSSIBLE);
    coarse.record(1.0);
    let before = merged.clone();
    assert!(!merged.merge(&coarse.snapshot()));
    assert_eq!(merged, before);
}

#[test]
fn test_bucket_count_follows_resolution() {
    let fine = latency_histogram();
    let coarse = Histogram::new(0.5, HISTOGRAM_MAX_POSSIBLE);
    assert!(fine.bucket_count() > coarse.bucket_count());
    assert_eq!(fine.snapshot().buckets.len(), fine.bucket_count());
}

#[test]
fn test_snapshot_serializes_for_the_metrics_endpoint() {
    let h = latency_histogram();
    h.record(1234.0);
    let s = h.snapshot();

    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(json["count"], 1);
    assert_eq!(json["resolution"], HISTOGRAM_RESOLUTION);
    assert_eq!(json["buckets"].as_array().unwrap().len(), s.buckets.len());
}

#[test]
#[should_panic(expected = "resolution must be positive")]
fn test_zero_resolution_panics() {
    Histogram::new(0.0, 10.0);
}
