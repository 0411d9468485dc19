use std::time::{Duration, Instant};

use jitterbench::clock::MonotonicClock;
use jitterbench::driver::{self, BenchmarkRun};
use jitterbench::errors::BenchError;
use jitterbench::histogram::Histogram;
use jitterbench::simulator::{OperationSimulator, RandomParkSimulator, SleepSimulator};
use jitterbench::types::OverflowPolicy;

#[test]
fn sleep_driver_scenario() {
    let histogram = Histogram::new(1_000, 10_000_000_000, 3, OverflowPolicy::Reject).unwrap();
    let simulator = SleepSimulator::from_millis(5);
    let bench = BenchmarkRun::new(100, 1_000_000.0).unwrap();

    let mut sink = Vec::new();
    let run = driver::run_to_sink(&bench, &simulator, histogram, &MonotonicClock::new(), &mut sink)
        .unwrap();

    assert_eq!(run.histogram.count(), 100);
    assert!(run.histogram.min() >= 5_000_000, "min = {}", run.histogram.min());
    let mean = run.histogram.mean();
    assert!(mean >= 5_000_000.0, "mean = {}", mean);
    // 5ms plus scheduler overhead, with room for a loaded CI machine.
    assert!(mean < 25_000_000.0, "mean = {}", mean);

    let out = String::from_utf8(sink).unwrap();
    assert!(out.contains("Total count    =          100"));
}

#[test]
fn randomized_simulator_never_undershoots_min() {
    let simulator = RandomParkSimulator::new(100, 100_000).unwrap();
    for _ in 0..10_000 {
        let start = Instant::now();
        simulator.execute_op().unwrap();
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_nanos(100),
            "sample below min: {:?}",
            elapsed
        );
    }
}

#[test]
fn randomized_driver_run_stays_in_range() {
    let histogram = Histogram::new(100, 250_000, 3, OverflowPolicy::Clamp).unwrap();
    let simulator = RandomParkSimulator::new(100, 100_000).unwrap();
    let bench = BenchmarkRun::new(2_000, 1000.0).unwrap();

    let run = driver::run_benchmark(&bench, &simulator, histogram, &MonotonicClock::new()).unwrap();

    assert_eq!(run.histogram.count(), 2_000);
    assert!(run.histogram.min() >= 100);
    assert!(run.histogram.value_at_percentile(0.0) <= run.histogram.min());
    assert!(run.histogram.value_at_percentile(100.0) >= run.histogram.max());
}

#[test]
fn empty_park_range_is_a_configuration_error() {
    let err = RandomParkSimulator::new(0, 0).unwrap_err();
    assert!(matches!(err, BenchError::InvalidParkRange { .. }));
    assert!(err.is_configuration());
}

#[test]
fn reference_histogram_scenario() {
    let mut histogram = Histogram::new(100, 250_000, 3, OverflowPolicy::Reject).unwrap();
    for v in [1000, 2000, 2000, 3000] {
        histogram.record(v).unwrap();
    }

    assert_eq!(histogram.count(), 4);
    assert_eq!(histogram.min(), 1000);
    assert_eq!(histogram.max(), 3000);
    assert!((histogram.value_at_percentile(50.0) as f64 - 2000.0).abs() <= 2.0);
    assert!((histogram.value_at_percentile(100.0) as f64 - 3000.0).abs() <= 3.0);
}
