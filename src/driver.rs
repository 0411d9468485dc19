use std::io::Write;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::errors::BenchError;
use crate::histogram::Histogram;
use crate::simulator::{OpOutcome, OperationSimulator};
use crate::types::AbortedSamplePolicy;

/// Parameters of one measurement run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRun {
    iterations: u64,
    scale_factor: f64,
    aborted_samples: AbortedSamplePolicy,
}

impl BenchmarkRun {
    pub fn new(iterations: u64, scale_factor: f64) -> Result<Self, BenchError> {
        if iterations == 0 {
            return Err(BenchError::InvalidRunConfig {
                detail: "iteration count must be positive".to_string(),
            });
        }
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(BenchError::InvalidRunConfig {
                detail: format!("scale factor must be a positive number, got {}", scale_factor),
            });
        }
        Ok(Self {
            iterations,
            scale_factor,
            aborted_samples: AbortedSamplePolicy::Discard,
        })
    }

    pub fn with_aborted_samples(mut self, policy: AbortedSamplePolicy) -> Self {
        self.aborted_samples = policy;
        self
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn aborted_samples(&self) -> AbortedSamplePolicy {
        self.aborted_samples
    }
}

/// What happened during a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub simulator: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: u64,
    pub recorded: u64,
    pub aborted: u64,
    pub clamped: u64,
}

impl RunReport {
    pub fn wall_time_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A run that went through every iteration. Only these are ever reported.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub report: RunReport,
    pub histogram: Histogram,
    scale_factor: f64,
}

impl CompletedRun {
    pub fn new(report: RunReport, histogram: Histogram, scale_factor: f64) -> Self {
        Self {
            report,
            histogram,
            scale_factor,
        }
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn output_percentile_distribution<W: Write + ?Sized>(
        &self,
        sink: &mut W,
    ) -> std::io::Result<()> {
        self.histogram
            .output_percentile_distribution(sink, self.scale_factor)
    }
}

/// Run `bench.iterations()` timed calls of `simulator`, recording each
/// elapsed time into `histogram`.
///
/// Any error ends the run and drops the histogram, so a failed run never
/// produces a partial distribution.
pub fn run_benchmark<C: Clock + ?Sized>(
    bench: &BenchmarkRun,
    simulator: &dyn OperationSimulator,
    mut histogram: Histogram,
    clock: &C,
) -> Result<CompletedRun, BenchError> {
    let simulator_label = simulator.describe();
    let started_at = Utc::now();
    info!(
        simulator = %simulator_label,
        iterations = bench.iterations,
        "benchmark started"
    );

    let mut recorded = 0u64;
    let mut aborted = 0u64;
    for _ in 0..bench.iterations {
        let start = clock.now_nanos();
        let outcome = simulator.execute_op()?;
        let end = clock.now_nanos();
        let elapsed = end
            .checked_sub(start)
            .ok_or(BenchError::ClockRegression { start, end })?;

        if let OpOutcome::Aborted(reason) = outcome {
            aborted += 1;
            if bench.aborted_samples == AbortedSamplePolicy::Discard {
                debug!(%reason, elapsed, "aborted sample discarded");
                continue;
            }
        }

        histogram.record(elapsed)?;
        recorded += 1;
    }

    let clamped = histogram.clamped_count();
    if clamped > 0 {
        warn!(
            clamped,
            highest = histogram.highest_trackable_value(),
            "samples above the trackable range were clamped"
        );
    }
    info!(recorded, aborted, "benchmark finished");

    let report = RunReport {
        simulator: simulator_label,
        started_at,
        finished_at: Utc::now(),
        iterations: bench.iterations,
        recorded,
        aborted,
        clamped,
    };
    Ok(CompletedRun::new(report, histogram, bench.scale_factor))
}

/// Run the benchmark, then write its percentile distribution to `sink`.
pub fn run_to_sink<C: Clock + ?Sized, W: Write + ?Sized>(
    bench: &BenchmarkRun,
    simulator: &dyn OperationSimulator,
    histogram: Histogram,
    clock: &C,
    sink: &mut W,
) -> Result<CompletedRun, BenchError> {
    let completed = run_benchmark(bench, simulator, histogram, clock)?;
    completed.output_percentile_distribution(sink)?;
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::AbortReason;
    use crate::types::OverflowPolicy;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Advances by a fixed step on every reading.
    struct SteppingClock {
        now: Cell<u64>,
        step: u64,
    }

    impl SteppingClock {
        fn new(step: u64) -> Self {
            Self {
                now: Cell::new(1_000_000),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now_nanos(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }
    }

    /// Jumps backwards on the second reading.
    struct RegressingClock {
        readings: Cell<u32>,
    }

    impl Clock for RegressingClock {
        fn now_nanos(&self) -> u64 {
            let n = self.readings.get();
            self.readings.set(n + 1);
            if n == 1 { 500 } else { 1_000 }
        }
    }

    struct Noop;

    impl OperationSimulator for Noop {
        fn execute_op(&self) -> Result<OpOutcome, BenchError> {
            Ok(OpOutcome::Completed)
        }

        fn describe(&self) -> String {
            "noop".to_string()
        }
    }

    /// Aborts every other call.
    #[derive(Default)]
    struct Flaky {
        calls: AtomicU32,
    }

    impl OperationSimulator for Flaky {
        fn execute_op(&self) -> Result<OpOutcome, BenchError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if n % 2 == 1 {
                Ok(OpOutcome::Aborted(AbortReason::Interrupted {
                    requested: Duration::from_millis(5),
                    waited: Duration::from_millis(1),
                }))
            } else {
                Ok(OpOutcome::Completed)
            }
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    struct Broken;

    impl OperationSimulator for Broken {
        fn execute_op(&self) -> Result<OpOutcome, BenchError> {
            Err(BenchError::SimulatorPoisoned)
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    fn histogram() -> Histogram {
        Histogram::new(100, 250_000, 3, OverflowPolicy::Reject).unwrap()
    }

    // --- BenchmarkRun ---

    #[test]
    fn rejects_zero_iterations() {
        let err = BenchmarkRun::new(0, 1000.0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(BenchmarkRun::new(10, 0.0).is_err());
        assert!(BenchmarkRun::new(10, -1.0).is_err());
        assert!(BenchmarkRun::new(10, f64::NAN).is_err());
        assert!(BenchmarkRun::new(10, f64::INFINITY).is_err());
    }

    #[test]
    fn defaults_to_discarding_aborted_samples() {
        let bench = BenchmarkRun::new(10, 1.0).unwrap();
        assert_eq!(bench.aborted_samples(), AbortedSamplePolicy::Discard);
    }

    // --- run_benchmark ---

    #[test]
    fn records_one_sample_per_iteration() {
        let bench = BenchmarkRun::new(250, 1000.0).unwrap();
        let clock = SteppingClock::new(1500);
        let run = run_benchmark(&bench, &Noop, histogram(), &clock).unwrap();
        assert_eq!(run.histogram.count(), 250);
        assert_eq!(run.report.recorded, 250);
        assert_eq!(run.report.iterations, 250);
        assert_eq!(run.histogram.min(), 1500);
        assert_eq!(run.histogram.max(), 1500);
        assert_eq!(run.report.simulator, "noop");
    }

    #[test]
    fn clock_regression_is_fatal() {
        let bench = BenchmarkRun::new(10, 1000.0).unwrap();
        let clock = RegressingClock {
            readings: Cell::new(0),
        };
        let err = run_benchmark(&bench, &Noop, histogram(), &clock).unwrap_err();
        assert!(matches!(
            err,
            BenchError::ClockRegression { start: 1_000, end: 500 }
        ));
    }

    #[test]
    fn failed_run_writes_nothing() {
        let bench = BenchmarkRun::new(10, 1000.0).unwrap();
        let clock = RegressingClock {
            readings: Cell::new(0),
        };
        let mut sink = Vec::new();
        assert!(run_to_sink(&bench, &Noop, histogram(), &clock, &mut sink).is_err());
        assert!(sink.is_empty());
    }

    #[test]
    fn simulator_failure_aborts_run() {
        let bench = BenchmarkRun::new(10, 1000.0).unwrap();
        let clock = SteppingClock::new(1000);
        let err = run_benchmark(&bench, &Broken, histogram(), &clock).unwrap_err();
        assert!(matches!(err, BenchError::SimulatorPoisoned));
    }

    #[test]
    fn overflow_aborts_run_under_reject() {
        let bench = BenchmarkRun::new(10, 1000.0).unwrap();
        let clock = SteppingClock::new(300_000);
        let err = run_benchmark(&bench, &Noop, histogram(), &clock).unwrap_err();
        assert!(matches!(err, BenchError::ValueOutOfRange { value: 300_000, .. }));
    }

    #[test]
    fn overflow_is_counted_under_clamp() {
        let bench = BenchmarkRun::new(10, 1000.0).unwrap();
        let clock = SteppingClock::new(300_000);
        let h = Histogram::new(100, 250_000, 3, OverflowPolicy::Clamp).unwrap();
        let run = run_benchmark(&bench, &Noop, h, &clock).unwrap();
        assert_eq!(run.report.clamped, 10);
        assert_eq!(run.histogram.count(), 10);
    }

    #[test]
    fn aborted_samples_discarded_by_default() {
        let bench = BenchmarkRun::new(10, 1000.0).unwrap();
        let clock = SteppingClock::new(1000);
        let sim = Flaky::default();
        let run = run_benchmark(&bench, &sim, histogram(), &clock).unwrap();
        assert_eq!(run.report.aborted, 5);
        assert_eq!(run.report.recorded, 5);
        assert_eq!(run.histogram.count(), 5);
    }

    #[test]
    fn aborted_samples_recorded_on_request() {
        let bench = BenchmarkRun::new(10, 1000.0)
            .unwrap()
            .with_aborted_samples(AbortedSamplePolicy::Record);
        let clock = SteppingClock::new(1000);
        let sim = Flaky::default();
        let run = run_benchmark(&bench, &sim, histogram(), &clock).unwrap();
        assert_eq!(run.report.aborted, 5);
        assert_eq!(run.histogram.count(), 10);
    }

    #[test]
    fn run_to_sink_writes_distribution() {
        let bench = BenchmarkRun::new(4, 1000.0).unwrap();
        let clock = SteppingClock::new(2000);
        let mut sink = Vec::new();
        let run = run_to_sink(&bench, &Noop, histogram(), &clock, &mut sink).unwrap();
        let out = String::from_utf8(sink).unwrap();
        assert!(out.contains("Percentile"));
        assert!(out.contains("#[Mean    ="));
        assert_eq!(run.histogram.count(), 4);
    }
}
