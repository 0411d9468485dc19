use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, warn};

use crate::errors::BenchError;
use crate::types::DrawPolicy;

/// Result of one simulated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Completed,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The wait was interrupted before the requested time had passed.
    Interrupted { requested: Duration, waited: Duration },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Interrupted { requested, waited } => write!(
                f,
                "interrupted after {:?} of a requested {:?}",
                waited, requested
            ),
        }
    }
}

/// A blocking unit of work whose duration is being measured.
pub trait OperationSimulator: Send + Sync {
    fn execute_op(&self) -> Result<OpOutcome, BenchError>;

    /// Short label for reports and logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Fixed-delay simulator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InterruptSignal {
    pending: Mutex<bool>,
    wakeup: Condvar,
}

/// Handle that aborts the current, or next, wait of a `SleepSimulator`.
#[derive(Debug, Clone)]
pub struct Interrupter {
    signal: Arc<InterruptSignal>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        // A poisoned flag still carries a usable bool.
        let mut pending = self
            .signal
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending = true;
        self.signal.wakeup.notify_all();
    }
}

/// Blocks for a fixed time through the scheduler.
///
/// Every call holds `exclusive` for the whole wait, so concurrent callers
/// queue up and at most one wait is in progress at a time.
#[derive(Debug)]
pub struct SleepSimulator {
    sleep_time: Duration,
    exclusive: Mutex<()>,
    signal: Arc<InterruptSignal>,
}

impl SleepSimulator {
    pub fn new(sleep_time: Duration) -> Self {
        debug!(?sleep_time, "sleep simulator created");
        Self {
            sleep_time,
            exclusive: Mutex::new(()),
            signal: Arc::new(InterruptSignal::default()),
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn sleep_time(&self) -> Duration {
        self.sleep_time
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            signal: Arc::clone(&self.signal),
        }
    }
}

impl OperationSimulator for SleepSimulator {
    fn execute_op(&self) -> Result<OpOutcome, BenchError> {
        let _turn = self
            .exclusive
            .lock()
            .map_err(|_| BenchError::SimulatorPoisoned)?;

        let started = Instant::now();
        let pending = self
            .signal
            .pending
            .lock()
            .map_err(|_| BenchError::SimulatorPoisoned)?;
        let (mut pending, _) = self
            .signal
            .wakeup
            .wait_timeout_while(pending, self.sleep_time, |interrupted| !*interrupted)
            .map_err(|_| BenchError::SimulatorPoisoned)?;

        if *pending {
            *pending = false;
            let reason = AbortReason::Interrupted {
                requested: self.sleep_time,
                waited: started.elapsed(),
            };
            warn!(%reason, "sleep aborted");
            return Ok(OpOutcome::Aborted(reason));
        }
        Ok(OpOutcome::Completed)
    }

    fn describe(&self) -> String {
        format!("sleep {}ms", self.sleep_time.as_millis())
    }
}

// ---------------------------------------------------------------------------
// Randomized busy-wait simulator
// ---------------------------------------------------------------------------

/// Spins on the monotonic clock for a randomly drawn time, never yielding.
#[derive(Debug)]
pub struct RandomParkSimulator {
    min_park_time_nanos: u64,
    max_park_time_nanos: u64,
    draw: DrawPolicy,
    rng: Mutex<StdRng>,
}

impl RandomParkSimulator {
    /// Park times are drawn from `[min, max)`. Fails unless `max > min`.
    pub fn new(min_park_time_nanos: u64, max_park_time_nanos: u64) -> Result<Self, BenchError> {
        Self::with_options(min_park_time_nanos, max_park_time_nanos, DrawPolicy::Uniform, None)
    }

    pub fn with_options(
        min_park_time_nanos: u64,
        max_park_time_nanos: u64,
        draw: DrawPolicy,
        seed: Option<u64>,
    ) -> Result<Self, BenchError> {
        if max_park_time_nanos <= min_park_time_nanos || max_park_time_nanos > i64::MAX as u64 {
            return Err(BenchError::InvalidParkRange {
                min: min_park_time_nanos,
                max: max_park_time_nanos,
            });
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!(
            min_park_time_nanos,
            max_park_time_nanos,
            ?draw,
            seeded = seed.is_some(),
            "random park simulator created"
        );
        Ok(Self {
            min_park_time_nanos,
            max_park_time_nanos,
            draw,
            rng: Mutex::new(rng),
        })
    }

    pub fn min_park_time_nanos(&self) -> u64 {
        self.min_park_time_nanos
    }

    pub fn max_park_time_nanos(&self) -> u64 {
        self.max_park_time_nanos
    }

    /// Draw the next park time in nanoseconds.
    pub fn next_park_nanos(&self) -> Result<u64, BenchError> {
        let mut rng = self.rng.lock().map_err(|_| BenchError::SimulatorPoisoned)?;
        Ok(draw_park_nanos(
            &mut *rng,
            self.min_park_time_nanos,
            self.max_park_time_nanos,
            self.draw,
        ))
    }
}

fn draw_park_nanos<R: RngCore>(rng: &mut R, min: u64, max: u64, draw: DrawPolicy) -> u64 {
    match draw {
        DrawPolicy::Uniform => rng.gen_range(min..max),
        DrawPolicy::LegacyModulo => {
            // max <= i64::MAX is checked at construction
            let raw = rng.next_u64() as i64;
            (raw % max as i64).unsigned_abs() + min
        }
    }
}

/// Spin until `park` has elapsed on the monotonic clock.
pub fn busy_wait(park: Duration) {
    let start = Instant::now();
    while start.elapsed() < park {
        std::hint::spin_loop();
    }
}

impl OperationSimulator for RandomParkSimulator {
    fn execute_op(&self) -> Result<OpOutcome, BenchError> {
        let park = self.next_park_nanos()?;
        busy_wait(Duration::from_nanos(park));
        Ok(OpOutcome::Completed)
    }

    fn describe(&self) -> String {
        format!(
            "park {}..{}ns ({})",
            self.min_park_time_nanos,
            self.max_park_time_nanos,
            match self.draw {
                DrawPolicy::Uniform => "uniform",
                DrawPolicy::LegacyModulo => "legacy-modulo",
            }
        )
    }
}
